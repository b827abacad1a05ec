mod host;
mod payload;
mod registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
