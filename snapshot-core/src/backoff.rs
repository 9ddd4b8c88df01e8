use std::time::Duration;

/// Smallest floor accepted; a zero floor would retry in a tight loop.
const MIN_FLOOR: Duration = Duration::from_millis(1);

/// Doubling retry delay bounded by a floor and a ceiling.
///
/// The delay survives across failed cycles and only returns to the floor on `reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(MIN_FLOOR);
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            next: floor,
        }
    }

    /// Delay to wait after the current failure; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Delay the next failure would get, without advancing.
    pub fn peek(&self) -> Duration {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = self.floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn doubles_until_ceiling() {
        let mut backoff = Backoff::new(secs(1), secs(300));
        let delays: Vec<u64> = (0..11).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300]);
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(secs(1), secs(300));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), secs(1));
        assert_eq!(backoff.peek(), secs(2));
    }

    #[test]
    fn zero_floor_still_backs_off() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        let first = backoff.next_delay();
        assert!(!first.is_zero());
        assert_eq!(backoff.next_delay(), first);

        let mut backoff = Backoff::new(Duration::ZERO, secs(1));
        let delays: Vec<Duration> = (0..3).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(4)
            ]
        );
    }

    #[test]
    fn ceiling_below_floor_is_clamped() {
        let mut backoff = Backoff::new(secs(10), secs(3));
        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(10));
    }
}
