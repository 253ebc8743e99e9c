use tracing::warn;

use crate::lockstep::{LockstepCursor, LockstepError};

/// How many births or deaths a step must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Whatever the live rules decide.
    Live,
    Exactly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepQuota {
    pub births: Quota,
    pub deaths: Quota,
}

impl StepQuota {
    pub const LIVE: StepQuota = StepQuota {
        births: Quota::Live,
        deaths: Quota::Live,
    };
}

/// Decides the birth and death budget of each step.
pub trait LifecycleRules {
    fn begin_step(&mut self, step: u64) -> Result<StepQuota, LockstepError>;

    /// Whether creation below the floor and smiting above the ceiling run.
    fn population_control(&self) -> bool;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct LiveRules;

impl LifecycleRules for LiveRules {
    fn begin_step(&mut self, _step: u64) -> Result<StepQuota, LockstepError> {
        Ok(StepQuota::LIVE)
    }

    fn population_control(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

/// Replays the birth and death counts of a lockstep log.
pub struct ReplayRules {
    cursor: LockstepCursor,
    engaged: bool,
}

impl ReplayRules {
    pub fn new(cursor: LockstepCursor) -> Self {
        ReplayRules {
            cursor,
            engaged: true,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

impl LifecycleRules for ReplayRules {
    fn begin_step(&mut self, step: u64) -> Result<StepQuota, LockstepError> {
        if !self.engaged {
            return Ok(StepQuota::LIVE);
        }
        if let Some(record) = self.cursor.take(step)? {
            return Ok(StepQuota {
                births: Quota::Exactly(record.births),
                deaths: Quota::Exactly(record.deaths),
            });
        }
        if self.cursor.is_exhausted()? {
            warn!(step, "lockstep log exhausted; resuming live rules");
            self.engaged = false;
            return Ok(StepQuota::LIVE);
        }
        Ok(StepQuota {
            births: Quota::Exactly(0),
            deaths: Quota::Exactly(0),
        })
    }

    fn population_control(&self) -> bool {
        !self.engaged
    }

    fn name(&self) -> &'static str {
        if self.engaged { "replay" } else { "live" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn live_rules_never_pin_counts() {
        let mut rules = LiveRules;
        assert_eq!(rules.begin_step(1).unwrap(), StepQuota::LIVE);
        assert!(rules.population_control());
    }

    #[test]
    fn replay_follows_the_log_then_disengages() {
        let cursor = LockstepCursor::from_reader(Cursor::new("2 1 3\n"));
        let mut rules = ReplayRules::new(cursor);
        assert!(!rules.population_control());
        assert_eq!(
            rules.begin_step(1).unwrap(),
            StepQuota {
                births: Quota::Exactly(0),
                deaths: Quota::Exactly(0)
            }
        );
        assert_eq!(
            rules.begin_step(2).unwrap(),
            StepQuota {
                births: Quota::Exactly(3),
                deaths: Quota::Exactly(1)
            }
        );
        assert_eq!(rules.begin_step(3).unwrap(), StepQuota::LIVE);
        assert!(!rules.is_engaged());
        assert!(rules.population_control());
        assert_eq!(rules.name(), "live");
    }
}
