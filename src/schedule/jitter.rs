use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Spreads wake-ups of tasks sharing the same nominal instant.
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    max: Duration,
}

impl Jitter {
    pub fn new(max: Duration) -> Self {
        Self {
            max: max.max(Duration::zero()),
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::zero())
    }

    /// Push `instant` forward by a fresh random offset in `[0, max]`.
    /// `None` stays `None`, and an instant too close to the end of
    /// representable time is left as is.
    pub fn apply(&self, instant: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let instant = instant?;
        let max_ms = self.max.num_milliseconds();
        if max_ms == 0 {
            return Some(instant);
        }

        let offset_ms = rand::thread_rng().gen_range(0..=max_ms);
        let jittered = Duration::try_milliseconds(offset_ms)
            .and_then(|offset| instant.checked_add_signed(offset));
        Some(jittered.unwrap_or(instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_jitter_stays_within_bounds_and_never_moves_backward() {
        let jitter = Jitter::new(Duration::seconds(30));
        let instant = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        for _ in 0..200 {
            let jittered = jitter.apply(Some(instant)).unwrap();
            assert!(jittered >= instant);
            assert!(jittered <= instant + Duration::seconds(30));
        }
    }

    #[test]
    fn test_jitter_is_recomputed_on_every_call() {
        let jitter = Jitter::new(Duration::seconds(60));
        let instant = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        let first = jitter.apply(Some(instant));
        let differs = (0..50).any(|_| jitter.apply(Some(instant)) != first);
        assert!(differs);
    }

    #[test]
    fn test_jitter_keeps_no_further_occurrences() {
        assert_eq!(Jitter::new(Duration::seconds(60)).apply(None), None);
        assert_eq!(Jitter::none().apply(None), None);
    }

    #[test]
    fn test_jitter_near_end_of_time_does_not_overflow() {
        let jitter = Jitter::new(Duration::seconds(60));
        let latest = DateTime::<Utc>::MAX_UTC;

        for _ in 0..20 {
            assert_eq!(jitter.apply(Some(latest)), Some(latest));
        }
        let jittered = jitter.apply(Some(latest - Duration::seconds(30))).unwrap();
        assert!(jittered >= latest - Duration::seconds(30));
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(Jitter::none().apply(Some(instant)), Some(instant));
        assert_eq!(Jitter::new(Duration::seconds(-5)).apply(Some(instant)), Some(instant));
    }
}
