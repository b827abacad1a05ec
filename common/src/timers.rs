use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    StartConfirm,
    StartGrace,
    StopConfirm,
    Resume,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 4] = [
        Self::StartConfirm,
        Self::StartGrace,
        Self::StopConfirm,
        Self::Resume,
    ];

    fn index(self) -> usize {
        match self {
            Self::StartConfirm => 0,
            Self::StartGrace => 1,
            Self::StopConfirm => 2,
            Self::Resume => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartConfirm => "start_confirm",
            Self::StartGrace => "start_grace",
            Self::StopConfirm => "stop_confirm",
            Self::Resume => "resume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pending<A> {
    due: DateTime<Utc>,
    action: A,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Recurring {
    interval: TimeDelta,
    due: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fired<A> {
    pub slot: TimerSlot,
    pub due: DateTime<Utc>,
    pub action: A,
}

#[derive(Debug, Clone)]
pub struct TimerSet<A> {
    slots: [Option<Pending<A>>; 4],
    recurring: Option<Recurring>,
}

impl<A: Copy> Default for TimerSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Copy> TimerSet<A> {
    pub fn new() -> Self {
        Self {
            slots: [None; 4],
            recurring: None,
        }
    }

    /// Arms `slot` to run `action` after `delay`.
    ///
    /// An occupied slot is left alone and keeps its original deadline;
    /// returns whether a new timer was armed.
    pub fn schedule(
        &mut self,
        slot: TimerSlot,
        delay: Duration,
        action: A,
        now: DateTime<Utc>,
    ) -> bool {
        let entry = &mut self.slots[slot.index()];
        if entry.is_some() {
            return false;
        }
        *entry = Some(Pending {
            due: deadline(now, delay),
            action,
        });
        true
    }

    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].take().is_some()
    }

    pub fn is_pending(&self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    pub fn due_at(&self, slot: TimerSlot) -> Option<DateTime<Utc>> {
        self.slots[slot.index()].map(|pending| pending.due)
    }

    pub fn schedule_recurring(&mut self, interval: Duration, now: DateTime<Utc>) -> bool {
        if self.recurring.is_some() {
            return false;
        }
        let interval = interval.max(Duration::from_secs(1));
        self.recurring = Some(Recurring {
            interval: to_delta(interval),
            due: deadline(now, interval),
        });
        true
    }

    pub fn cancel_recurring(&mut self) -> bool {
        self.recurring.take().is_some()
    }

    pub fn cancel_all(&mut self) {
        for slot in TimerSlot::ALL {
            self.cancel(slot);
        }
        self.cancel_recurring();
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.slots
            .iter()
            .flatten()
            .map(|pending| pending.due)
            .chain(self.recurring.map(|recurring| recurring.due))
            .min()
    }

    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Fired<A>> {
        let slot = TimerSlot::ALL
            .into_iter()
            .filter_map(|slot| self.slots[slot.index()].map(|pending| (slot, pending.due)))
            .filter(|(_, due)| *due <= now)
            .min_by_key(|(slot, due)| (*due, slot.index()))
            .map(|(slot, _)| slot)?;

        let pending = self.slots[slot.index()].take()?;
        Some(Fired {
            slot,
            due: pending.due,
            action: pending.action,
        })
    }

    /// Consumes a due tick and re-arms it on the next interval boundary after
    /// `now`. Missed intervals collapse into this single tick.
    pub fn take_tick(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let recurring = self.recurring.as_mut()?;
        if recurring.due > now {
            return None;
        }
        let fired = recurring.due;
        while recurring.due <= now {
            recurring.due = recurring
                .due
                .checked_add_signed(recurring.interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
        Some(fired)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn deadline(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_delta(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
