//! Portable timestamps.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

const NSEC_PER_SEC: i64 = 1_000_000_000;
const NSEC_PER_MSEC: i64 = 1_000_000;

/// Seconds and nanoseconds since the Unix epoch, or one of the two
/// `utimensat` sentinels.
///
/// Ordering follows the combined millisecond value; two values in the same
/// millisecond fall back to field order so that `Ord` agrees with `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    /// Nanosecond value meaning "leave this timestamp unchanged".
    pub const OMIT_NSEC: i64 = -2;
    /// Nanosecond value meaning "use the time of the call".
    pub const NOW_NSEC: i64 = -1;

    pub const OMIT: TimeSpec = TimeSpec {
        sec: 0,
        nsec: Self::OMIT_NSEC,
    };
    pub const NOW: TimeSpec = TimeSpec {
        sec: 0,
        nsec: Self::NOW_NSEC,
    };
    pub const EPOCH: TimeSpec = TimeSpec { sec: 0, nsec: 0 };

    pub const fn new(sec: i64, nsec: i64) -> Self {
        TimeSpec { sec, nsec }
    }

    pub const fn is_omit(&self) -> bool {
        self.nsec == Self::OMIT_NSEC
    }

    pub const fn is_now(&self) -> bool {
        self.nsec == Self::NOW_NSEC
    }

    /// The current instant.
    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// `sec * 1000 + nsec / 1_000_000`.
    pub const fn total_millis(&self) -> i64 {
        self.sec
            .saturating_mul(1000)
            .saturating_add(self.nsec / NSEC_PER_MSEC)
    }

    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        TimeSpec {
            sec: instant.timestamp(),
            nsec: i64::from(instant.timestamp_subsec_nanos() % NSEC_PER_SEC as u32),
        }
    }

    /// Converts to an absolute instant.
    ///
    /// `NOW` resolves to the current instant; `OMIT` (and values chrono cannot
    /// represent) yield `None`.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_now() {
            return Some(Utc::now());
        }
        if self.is_omit() || !(0..NSEC_PER_SEC).contains(&self.nsec) {
            return None;
        }
        Utc.timestamp_opt(self.sec, self.nsec as u32).single()
    }

    /// Replaces the `NOW` sentinel by the current instant; other values pass
    /// through unchanged.
    pub fn resolve(self) -> Self {
        if self.is_now() {
            Self::current()
        } else {
            self
        }
    }

    pub fn to_system_time(&self) -> Option<SystemTime> {
        self.to_datetime().map(SystemTime::from)
    }
}

impl From<DateTime<Utc>> for TimeSpec {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::from_datetime(instant)
    }
}

impl From<SystemTime> for TimeSpec {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => TimeSpec {
                sec: after.as_secs() as i64,
                nsec: i64::from(after.subsec_nanos()),
            },
            Err(before) => {
                let before = before.duration();
                let mut sec = -(before.as_secs() as i64);
                let mut nsec = -i64::from(before.subsec_nanos());
                if nsec < 0 {
                    sec -= 1;
                    nsec += NSEC_PER_SEC;
                }
                TimeSpec { sec, nsec }
            }
        }
    }
}

impl Ord for TimeSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_millis()
            .cmp(&other.total_millis())
            .then(self.sec.cmp(&other.sec))
            .then(self.nsec.cmp(&other.nsec))
    }
}

impl PartialOrd for TimeSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_sentinels() {
        assert!(TimeSpec::OMIT.is_omit());
        assert!(!TimeSpec::OMIT.is_now());
        assert!(TimeSpec::NOW.is_now());
        assert!(!TimeSpec::EPOCH.is_now());
        assert!(!TimeSpec::EPOCH.is_omit());
    }

    #[test]
    fn test_now_resolves_to_current_instant() {
        let before = Utc::now();
        let resolved = TimeSpec::NOW.to_datetime().unwrap();
        assert!(resolved >= before);
        assert!(resolved - before < Duration::seconds(5));
        assert!(!TimeSpec::NOW.resolve().is_now());
    }

    #[test]
    fn test_omit_has_no_instant() {
        assert!(TimeSpec::OMIT.to_datetime().is_none());
        assert!(TimeSpec::OMIT.resolve().is_omit());
    }

    #[test]
    fn test_ordering_by_millis() {
        let a = TimeSpec::new(10, 500_000_000);
        let b = TimeSpec::new(11, 0);
        assert!(a < b);
        assert_eq!(a.total_millis(), 10_500);

        // Same millisecond, different nanoseconds: ordered but not equal.
        let c = TimeSpec::new(10, 500_000_001);
        assert_ne!(a, c);
        assert!(a < c);
        assert_eq!(a.total_millis(), c.total_millis());
    }

    #[test]
    fn test_from_system_time_before_epoch() {
        let t = UNIX_EPOCH - std::time::Duration::from_millis(1500);
        let spec = TimeSpec::from(t);
        assert_eq!(spec, TimeSpec::new(-2, 500_000_000));
        assert_eq!(spec.to_system_time(), Some(t));
    }

    proptest! {
        #[test]
        fn prop_datetime_round_trip(secs in -10_000_000_000i64..10_000_000_000i64, nanos in 0u32..1_000_000_000) {
            let instant = Utc.timestamp_opt(secs, nanos).single().unwrap();
            let spec = TimeSpec::from(instant);
            prop_assert!(!spec.is_now());
            prop_assert!(!spec.is_omit());
            let back = spec.to_datetime().unwrap();
            prop_assert_eq!(back.timestamp_millis(), instant.timestamp_millis());
        }

        #[test]
        fn prop_order_consistent_with_eq(a_s in -1000i64..1000, a_n in 0i64..1_000_000_000, b_s in -1000i64..1000, b_n in 0i64..1_000_000_000) {
            let a = TimeSpec::new(a_s, a_n);
            let b = TimeSpec::new(b_s, b_n);
            prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
            if a.total_millis() < b.total_millis() {
                prop_assert!(a < b);
            }
        }
    }
}
