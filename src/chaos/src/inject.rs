use std::fmt;
use std::time::Duration;

use rand::Rng;

/// How tracker scores convert into injected delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Track sequences but never delay.
    Off,
    /// Uniform random delay, ignoring scores.
    Random,
    /// Delay proportional to the frequency-table novelty score.
    Frequency,
    /// Delay proportional to the squared path-tree repeat score.
    Tree,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" | "no" => Some(Strategy::Off),
            "random" | "rnd" => Some(Strategy::Random),
            "freq" | "exp" => Some(Strategy::Frequency),
            "tree" => Some(Strategy::Tree),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Off => write!(f, "off"),
            Strategy::Random => write!(f, "random"),
            Strategy::Frequency => write!(f, "freq"),
            Strategy::Tree => write!(f, "tree"),
        }
    }
}

/// What to do with one classified chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Sleep this long before acting.
    pub delay: Duration,
    /// Tear the connection down instead of forwarding.
    pub crash: bool,
}

impl Decision {
    pub fn forward() -> Self {
        Decision {
            delay: Duration::ZERO,
            crash: false,
        }
    }
}

/// Converts a tracker score into a sleep and a crash/no-crash decision.
///
/// A computed delay above `time_limit * (100 - crash_percent) / 100`
/// upgrades into a simulated crash: the injector still sleeps, then the
/// connection is closed instead of forwarded, exercising the 2PC
/// engine's partial-failure handling.
pub struct DelayCrashInjector {
    strategy: Strategy,
    time_limit_ms: u64,
    crash_percent: u64,
    crash_threshold_ms: u64,
}

impl DelayCrashInjector {
    pub fn new(strategy: Strategy, time_limit_ms: u64, crash_percent: u64) -> Self {
        let crash_percent = crash_percent.min(100);
        DelayCrashInjector {
            strategy,
            time_limit_ms,
            crash_percent,
            crash_threshold_ms: time_limit_ms * (100 - crash_percent) / 100,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn decide(&self, score: u64) -> Decision {
        let raw = match self.strategy {
            Strategy::Off => 0,
            Strategy::Random => {
                if self.time_limit_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..self.time_limit_ms)
                }
            }
            Strategy::Frequency => score,
            Strategy::Tree => score.saturating_mul(score),
        };

        let crash = self.crash_percent > 0 && raw > self.crash_threshold_ms;
        Decision {
            delay: Duration::from_millis(raw.min(self.time_limit_ms)),
            crash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_trigger_boundary() {
        // timeLimit=1000, x=80 => crashThreshold=200
        let injector = DelayCrashInjector::new(Strategy::Frequency, 1000, 80);

        let at_threshold = injector.decide(200);
        assert!(!at_threshold.crash);
        assert_eq!(at_threshold.delay, Duration::from_millis(200));

        let above = injector.decide(201);
        assert!(above.crash);
        assert_eq!(above.delay, Duration::from_millis(201));
    }

    #[test]
    fn test_off_never_delays() {
        let injector = DelayCrashInjector::new(Strategy::Off, 1000, 80);
        for score in [0, 10, 10_000] {
            let decision = injector.decide(score);
            assert_eq!(decision, Decision::forward());
        }
    }

    #[test]
    fn test_tree_squares_score() {
        let injector = DelayCrashInjector::new(Strategy::Tree, 1000, 80);
        let decision = injector.decide(3);
        assert_eq!(decision.delay, Duration::from_millis(9));
        assert!(!decision.crash);

        // 15^2 = 225 crosses the 200ms threshold
        assert!(injector.decide(15).crash);
    }

    #[test]
    fn test_delay_capped_at_limit() {
        let injector = DelayCrashInjector::new(Strategy::Frequency, 1000, 50);
        let decision = injector.decide(5000);
        assert_eq!(decision.delay, Duration::from_millis(1000));
        assert!(decision.crash);
    }

    #[test]
    fn test_zero_crash_percent_never_crashes() {
        let injector = DelayCrashInjector::new(Strategy::Frequency, 1000, 0);
        assert!(!injector.decide(5000).crash);
    }

    #[test]
    fn test_random_stays_under_limit() {
        let injector = DelayCrashInjector::new(Strategy::Random, 100, 0);
        for _ in 0..50 {
            let decision = injector.decide(0);
            assert!(decision.delay < Duration::from_millis(100));
        }
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(Strategy::parse("tree"), Some(Strategy::Tree));
        assert_eq!(Strategy::parse("rnd"), Some(Strategy::Random));
        assert_eq!(Strategy::parse("freq"), Some(Strategy::Frequency));
        assert_eq!(Strategy::parse("off"), Some(Strategy::Off));
        assert_eq!(Strategy::parse("bogus"), None);
    }
}
