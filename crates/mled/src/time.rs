//! Wraparound-safe arithmetic over the free-running 32-bit show clock.
//!
//! Show-time is a millisecond counter that wraps at 2^32. Two show-times are
//! only ever compared through their signed difference; plain subtraction is
//! wrong once the counter wraps.

use std::time::Instant;

const HALF_RANGE: u32 = 0x7FFF_FFFF;

/// Signed `a - b`. The antipodal distance `0x8000_0000` maps to `i32::MIN`
/// in both directions.
#[inline]
pub fn diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Signed elapsed time from `start` to `end`.
#[inline]
pub fn duration(start: u32, end: u32) -> i32 {
    diff(end, start)
}

/// True once `now` has reached `execute_at`.
#[inline]
pub fn is_due(now: u32, execute_at: u32) -> bool {
    now.wrapping_sub(execute_at) <= HALF_RANGE
}

/// Millisecond show clock anchored at a monotonic instant.
#[derive(Debug, Clone, Copy)]
pub struct ShowClock {
    start: Instant,
}

impl Default for ShowClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { start }
    }

    pub fn now_ms(&self) -> u32 {
        self.at(Instant::now())
    }

    pub fn at(&self, instant: Instant) -> u32 {
        let elapsed = instant.saturating_duration_since(self.start).as_millis();
        (elapsed & u128::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLES: [u32; 12] = [
        0,
        1,
        2,
        100,
        0x7FFF_FFFE,
        0x7FFF_FFFF,
        0x8000_0000,
        0x8000_0001,
        0xFFFF_FFF0,
        0xFFFF_FFFE,
        u32::MAX,
        0x1234_5678,
    ];

    #[test]
    fn test_diff_no_wrap() {
        assert_eq!(diff(150, 100), 50);
        assert_eq!(diff(100, 150), -50);
        assert_eq!(duration(100, 150), 50);
    }

    #[test]
    fn test_diff_across_wrap() {
        assert_eq!(diff(0x0000_0010, 0xFFFF_FFF0), 0x20);
        assert_eq!(diff(0xFFFF_FFF0, 0x0000_0010), -0x20);
        assert_eq!(duration(0xFFFF_FFF0, 0x0000_0010), 0x20);
    }

    #[test]
    fn test_diff_is_antisymmetric() {
        for &a in &SAMPLES {
            for &b in &SAMPLES {
                let forward = diff(a, b);
                let backward = diff(b, a);
                if a.wrapping_sub(b) == 0x8000_0000 {
                    assert_eq!(forward, i32::MIN);
                    assert_eq!(backward, i32::MIN);
                } else {
                    assert_eq!(forward, -backward, "a={a:#x} b={b:#x}");
                }
                assert_eq!(duration(b, a), forward);
            }
        }
    }

    #[test]
    fn test_is_due() {
        assert!(is_due(100, 100));
        assert!(is_due(101, 100));
        assert!(!is_due(100, 101));

        for &t in &SAMPLES {
            assert!(is_due(t, t));
            assert!(!is_due(t.wrapping_sub(1), t));
            assert!(is_due(t.wrapping_add(1), t));
        }
    }

    #[test]
    fn test_is_due_agrees_with_diff() {
        for &now in &SAMPLES {
            for &at in &SAMPLES {
                assert_eq!(is_due(now, at), diff(now, at) >= 0, "now={now:#x} at={at:#x}");
            }
        }
    }

    #[test]
    fn test_show_clock_truncates() {
        let start = Instant::now();
        let clock = ShowClock::starting_at(start);

        assert_eq!(clock.at(start), 0);
        assert_eq!(clock.at(start + Duration::from_millis(1500)), 1500);
        assert_eq!(
            clock.at(start + Duration::from_millis(u64::from(u32::MAX) + 11)),
            10
        );
    }
}
