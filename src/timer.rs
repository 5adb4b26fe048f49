//! One-second countdown used by timed game variants.
//!
//! The countdown is local-clock-driven: the owner calls [`Countdown::tick`]
//! once per wall-clock second while the session is in an active phase. It is
//! never resynchronized against the server; drift of a few seconds versus
//! the backend's own enforcement is accepted.

/// What happens when the countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Force the session into its failed terminal phase.
    FailOnExpiry,
    /// Freeze at zero and stop decrementing (untimed-failure variants).
    FreezeAtZero,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting; the payload is the remaining seconds.
    Running(u32),
    /// This tick consumed the final second under [`TimeoutPolicy::FailOnExpiry`].
    Expired,
    /// Already at zero (or configured with no limit); nothing changed.
    Idle,
}

/// A remaining-seconds counter with a zero-crossing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    policy: TimeoutPolicy,
    expired: bool,
}

impl Countdown {
    /// Create a countdown starting at `seconds`. A zero limit never ticks.
    pub fn new(seconds: u32, policy: TimeoutPolicy) -> Self {
        Self {
            remaining: seconds,
            policy,
            expired: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    /// Consume one second. Expiry fires exactly once, on the tick that
    /// reaches zero — never earlier, never again afterwards.
    pub fn tick(&mut self) -> TickOutcome {
        if self.remaining == 0 {
            return TickOutcome::Idle;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            match self.policy {
                TimeoutPolicy::FailOnExpiry if !self.expired => {
                    self.expired = true;
                    TickOutcome::Expired
                }
                _ => TickOutcome::Idle,
            }
        } else {
            TickOutcome::Running(self.remaining)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_zero_after_n_ticks() {
        let mut countdown = Countdown::new(3, TimeoutPolicy::FreezeAtZero);
        assert_eq!(countdown.tick(), TickOutcome::Running(2));
        assert_eq!(countdown.tick(), TickOutcome::Running(1));
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn fail_policy_expires_exactly_on_final_tick() {
        let mut countdown = Countdown::new(2, TimeoutPolicy::FailOnExpiry);
        assert_eq!(countdown.tick(), TickOutcome::Running(1));
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        // Further ticks are inert — expiry must not fire twice.
        assert_eq!(countdown.tick(), TickOutcome::Idle);
    }

    #[test]
    fn zero_limit_never_ticks() {
        let mut countdown = Countdown::new(0, TimeoutPolicy::FailOnExpiry);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn freeze_policy_stops_at_zero() {
        let mut countdown = Countdown::new(1, TimeoutPolicy::FreezeAtZero);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.remaining(), 0);
    }
}
