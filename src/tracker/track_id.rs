//! Track identifiers and the optional day clock used to keep them compact.

use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;

/// Persistent track identifier.
///
/// Without a clock this is a plain sequence number. With a clock the sequence
/// restarts every day and the day is part of the identifier, so a restarted
/// sequence can never collide with an identifier issued earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId {
    pub day: Option<NaiveDate>,
    pub seq: u64,
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day {
            Some(day) => write!(f, "{}_{}", day.format("%Y-%m-%d"), self.seq),
            None => write!(f, "{}", self.seq),
        }
    }
}

/// Time source queried when a new identifier is issued.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    /// Day the identifier sequence belongs to.
    fn day_key(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall clock. Days start at `day_start` (midnight by default), so a
/// deployment can roll its identifiers over at a quiet hour.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    day_start: NaiveTime,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::default(),
        }
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day_start(day_start: NaiveTime) -> Self {
        Self { day_start }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn day_key(&self) -> NaiveDate {
        let shifted = self.now() - self.day_start.signed_duration_since(NaiveTime::default());
        shifted.date()
    }
}

/// Monotonic identifier source owned by one tracker.
pub(crate) struct IdAllocator {
    clock: Option<Box<dyn Clock + Send + Sync>>,
    day: Option<NaiveDate>,
    next_seq: u64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self {
            clock: None,
            day: None,
            next_seq: 1,
        }
    }

    pub(crate) fn set_clock(&mut self, clock: Box<dyn Clock + Send + Sync>) {
        self.clock = Some(clock);
    }

    pub(crate) fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    /// Identifier the next call to `next_id` will hand out, without consuming it.
    pub(crate) fn peek(&self) -> TrackId {
        let day = match &self.clock {
            Some(clock) => self.rolled_day(clock.day_key()),
            None => self.day,
        };
        let seq = if day != self.day { 1 } else { self.next_seq };
        TrackId { day, seq }
    }

    pub(crate) fn next_id(&mut self) -> TrackId {
        if let Some(clock) = &self.clock {
            let day = self.rolled_day(clock.day_key());
            if day != self.day {
                if let Some(previous) = self.day {
                    info!(
                        %previous,
                        today = ?day,
                        issued = self.next_seq - 1,
                        "day boundary, restarting track ids"
                    );
                }
                self.day = day;
                self.next_seq = 1;
            }
        }
        let id = TrackId {
            day: self.day,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        id
    }

    /// Only a strictly later day restarts the sequence; a clock stepping
    /// backwards keeps counting in the current day.
    fn rolled_day(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self.day {
            Some(current) if today <= current => Some(current),
            _ => Some(today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ManualClock(Arc<Mutex<NaiveDateTime>>);

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_sequence_without_clock() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.peek().seq, 1);
        assert_eq!(ids.next_id(), TrackId { day: None, seq: 1 });
        assert_eq!(ids.next_id().to_string(), "2");
    }

    #[test]
    fn test_day_rollover() {
        let now = Arc::new(Mutex::new(at(2024, 3, 1, 23)));
        let mut ids = IdAllocator::new();
        ids.set_clock(Box::new(ManualClock(now.clone())));

        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.to_string(), "2024-03-01_1");
        assert_eq!(b.seq, 2);

        *now.lock().unwrap() = at(2024, 3, 2, 1);
        assert_eq!(ids.peek().seq, 1);
        let c = ids.next_id();
        assert_eq!(c.to_string(), "2024-03-02_1");
        assert_ne!(a, c);

        // Clock stepping back does not restart the sequence.
        *now.lock().unwrap() = at(2024, 3, 1, 12);
        let d = ids.next_id();
        assert_eq!(d.to_string(), "2024-03-02_2");
    }

    #[test]
    fn test_system_clock_day_start() {
        let clock = SystemClock::with_day_start(NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        let now = clock.now();
        let key = clock.day_key();
        assert!(key == now.date() || key == now.date().pred_opt().unwrap());
    }
}
