//! Present-position polling and convergence evaluation.
//!
//! Each poll pass issues one independent read per servo; a failure on one
//! servo never blocks the others, it simply keeps that servo from counting
//! as arrived until a later pass succeeds.

use core::fmt;

use heapless::Vec;

use crate::bus::{DeviceError, DeviceProtocol, Register, ServoId};
use crate::codec::{self, Position};
use crate::config::MAX_SERVOS;

/// One servo's target for the current cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Goal {
    pub id: ServoId,
    pub position: Position,
}

/// Failure to obtain one servo's present position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadError {
    /// The register exchange failed.
    Device(DeviceError),
    /// The register word did not decode to a position.
    Decode(codec::EncodeError),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Device(error) => write!(f, "{error}"),
            ReadError::Decode(error) => write!(f, "{error}"),
        }
    }
}

/// Outcome of one present-position read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PresentSample {
    pub id: ServoId,
    pub reading: Result<Position, ReadError>,
}

/// Reads present positions and evaluates arrival against goals.
#[derive(Copy, Clone, Debug)]
pub struct ConvergencePoller {
    register: Register,
    tolerance: u16,
}

impl ConvergencePoller {
    /// Creates a poller for the given present-position register.
    #[must_use]
    pub const fn new(register: Register, tolerance: u16) -> Self {
        Self {
            register,
            tolerance,
        }
    }

    /// Issues one read per goal and returns a sample per servo. Failed
    /// reads are carried as error samples; the remaining servos are still
    /// read.
    pub fn poll<P: DeviceProtocol>(
        &self,
        proto: &mut P,
        goals: &[Goal],
    ) -> Vec<PresentSample, MAX_SERVOS> {
        let mut samples = Vec::new();
        for goal in goals {
            let reading = match proto.read_register(goal.id, self.register) {
                Ok(raw) => codec::decode_position(raw.to_le_bytes()).map_err(ReadError::Decode),
                Err(error) => Err(ReadError::Device(error)),
            };
            if samples.push(PresentSample {
                id: goal.id,
                reading,
            })
            .is_err()
            {
                // The goal set shares the sample capacity bound.
                break;
            }
        }
        samples
    }

    /// Aggregate convergence for this poller's tolerance.
    #[must_use]
    pub fn converged(&self, goals: &[Goal], samples: &[PresentSample]) -> bool {
        has_converged(goals, samples, self.tolerance)
    }

    /// Arrival check for a single goal against this poller's tolerance.
    #[must_use]
    pub fn arrived(&self, goal: Goal, samples: &[PresentSample]) -> bool {
        servo_arrived(goal, samples, self.tolerance)
    }
}

/// Returns `true` only when every goal has a successful sample within
/// `tolerance`. Missing or errored samples count as not arrived; callers
/// poll again rather than treating them as failures. An empty goal set is
/// converged by definition.
#[must_use]
pub fn has_converged(goals: &[Goal], samples: &[PresentSample], tolerance: u16) -> bool {
    goals
        .iter()
        .all(|goal| servo_arrived(*goal, samples, tolerance))
}

/// Arrival check for one goal against a sample set.
#[must_use]
pub fn servo_arrived(goal: Goal, samples: &[PresentSample], tolerance: u16) -> bool {
    samples
        .iter()
        .find(|sample| sample.id == goal.id)
        .is_some_and(|sample| match sample.reading {
            Ok(present) => within_tolerance(goal.position, present, tolerance),
            Err(_) => false,
        })
}

fn within_tolerance(goal: Position, present: Position, tolerance: u16) -> bool {
    let error = i64::from(goal) - i64::from(present);
    error.unsigned_abs() < u64::from(tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CommError, ModelNumber, RegisterWidth, SyncEntry};
    use crate::config::DX_PRESENT_POSITION;

    fn goal(id: ServoId, position: Position) -> Goal {
        Goal { id, position }
    }

    fn ok_sample(id: ServoId, present: Position) -> PresentSample {
        PresentSample {
            id,
            reading: Ok(present),
        }
    }

    fn failed_sample(id: ServoId) -> PresentSample {
        PresentSample {
            id,
            reading: Err(ReadError::Device(DeviceError::Comm(CommError::Timeout))),
        }
    }

    #[test]
    fn within_tolerance_counts_as_converged() {
        let goals = [goal(1, 100)];
        let samples = [ok_sample(1, 95)];
        assert!(has_converged(&goals, &samples, 10));
    }

    #[test]
    fn outside_tolerance_is_not_converged() {
        let goals = [goal(1, 100)];
        let samples = [ok_sample(1, 80)];
        assert!(!has_converged(&goals, &samples, 10));
    }

    #[test]
    fn tolerance_bound_is_exclusive() {
        let goals = [goal(1, 100)];
        assert!(!has_converged(&goals, &[ok_sample(1, 90)], 10));
        assert!(has_converged(&goals, &[ok_sample(1, 91)], 10));
    }

    #[test]
    fn missing_reads_are_not_converged() {
        let goals = [goal(1, 100)];
        assert!(!has_converged(&goals, &[], 10));
    }

    #[test]
    fn errored_reads_are_not_converged() {
        let goals = [goal(1, 100)];
        let samples = [failed_sample(1)];
        assert!(!has_converged(&goals, &samples, 10));
    }

    #[test]
    fn empty_goal_set_is_converged() {
        assert!(has_converged(&[], &[], 10));
    }

    #[test]
    fn one_lagging_servo_blocks_the_aggregate() {
        let goals = [goal(1, 100), goal(2, 50)];
        let samples = [ok_sample(1, 99), ok_sample(2, 10)];
        assert!(!has_converged(&goals, &samples, 10));
        assert!(servo_arrived(goals[0], &samples, 10));
        assert!(!servo_arrived(goals[1], &samples, 10));
    }

    struct FlakyBus {
        failing_id: ServoId,
        present: u32,
    }

    impl DeviceProtocol for FlakyBus {
        fn write_register(
            &mut self,
            _: ServoId,
            _: Register,
            _: u32,
        ) -> Result<(), DeviceError> {
            Ok(())
        }

        fn read_register(&mut self, id: ServoId, _: Register) -> Result<u32, DeviceError> {
            if id == self.failing_id {
                Err(DeviceError::Comm(CommError::Timeout))
            } else {
                Ok(self.present)
            }
        }

        fn ping(&mut self, _: ServoId) -> Result<ModelNumber, DeviceError> {
            Ok(0)
        }

        fn sync_write(&mut self, _: Register, _: &[SyncEntry]) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[test]
    fn one_failing_read_does_not_block_the_others() {
        let poller = ConvergencePoller::new(DX_PRESENT_POSITION, 10);
        let mut bus = FlakyBus {
            failing_id: 2,
            present: 500,
        };
        let goals = [goal(1, 500), goal(2, 500), goal(3, 500)];

        let samples = poller.poll(&mut bus, &goals);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].reading, Ok(500));
        assert!(samples[1].reading.is_err());
        assert_eq!(samples[2].reading, Ok(500));
        assert!(!poller.converged(&goals, &samples));
    }

    #[test]
    fn oversized_register_words_surface_as_decode_errors() {
        struct SaturatedBus;

        impl DeviceProtocol for SaturatedBus {
            fn write_register(
                &mut self,
                _: ServoId,
                _: Register,
                _: u32,
            ) -> Result<(), DeviceError> {
                Ok(())
            }

            fn read_register(&mut self, _: ServoId, _: Register) -> Result<u32, DeviceError> {
                Ok(u32::MAX)
            }

            fn ping(&mut self, _: ServoId) -> Result<ModelNumber, DeviceError> {
                Ok(0)
            }

            fn sync_write(&mut self, _: Register, _: &[SyncEntry]) -> Result<(), DeviceError> {
                Ok(())
            }
        }

        let poller = ConvergencePoller::new(Register::new(36, RegisterWidth::DoubleWord), 10);
        let samples = poller.poll(&mut SaturatedBus, &[goal(1, 0)]);
        assert!(matches!(samples[0].reading, Err(ReadError::Decode(_))));
    }
}
