use cycle_common::CycleProfile;

const IDLE_LEAD_SECS: u64 = 120;
const WASH_SECS: u64 = 1_200;
const DIP_EVERY_SECS: u64 = 300;
const SPIN_SECS: u64 = 300;
const DOOR_OPEN_SECS: u64 = 60;
const IDLE_TAIL_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Wash,
    Dip,
    Spin,
    QuietTail,
    Unload,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wash => "wash",
            Self::Dip => "dip",
            Self::Spin => "spin",
            Self::QuietTail => "quiet tail",
            Self::Unload => "unload",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WasherCurve {
    profile: CycleProfile,
    dip_secs: u64,
    tail_secs: u64,
}

impl WasherCurve {
    pub fn new(profile: CycleProfile) -> Self {
        // Dips must recover before either debounce can confirm a stop.
        let dip_secs = (profile.start_grace / 2).clamp(10, DIP_EVERY_SECS / 2);
        let tail_secs = profile.stop_delay().as_secs() + 120;
        Self {
            profile,
            dip_secs,
            tail_secs,
        }
    }

    pub fn period_secs(&self) -> u64 {
        IDLE_LEAD_SECS + WASH_SECS + SPIN_SECS + self.tail_secs + DOOR_OPEN_SECS + IDLE_TAIL_SECS
    }

    pub fn phase_at(&self, elapsed_secs: u64) -> Phase {
        let mut t = elapsed_secs % self.period_secs();

        if t < IDLE_LEAD_SECS {
            return Phase::Idle;
        }
        t -= IDLE_LEAD_SECS;

        if t < WASH_SECS {
            let into_slot = t % DIP_EVERY_SECS;
            let dipping = t >= DIP_EVERY_SECS && into_slot < self.dip_secs;
            return if dipping { Phase::Dip } else { Phase::Wash };
        }
        t -= WASH_SECS;

        if t < SPIN_SECS {
            return Phase::Spin;
        }
        t -= SPIN_SECS;

        if t < self.tail_secs {
            return Phase::QuietTail;
        }
        t -= self.tail_secs;

        if t < DOOR_OPEN_SECS {
            Phase::Unload
        } else {
            Phase::Idle
        }
    }

    pub fn power_at(&self, elapsed_secs: u64) -> f64 {
        let on = self.profile.on_threshold;
        let off = self.profile.off_threshold;
        match self.phase_at(elapsed_secs) {
            Phase::Idle | Phase::Unload => off * 0.25,
            Phase::Wash => on * 20.0,
            Phase::Dip => off * 0.5,
            Phase::Spin => on * 40.0,
            Phase::QuietTail => off * 0.1,
        }
    }

    pub fn door_open_at(&self, elapsed_secs: u64) -> bool {
        self.phase_at(elapsed_secs) == Phase::Unload
    }
}
