//! Torque-enable lifecycle.
//!
//! Enable runs fail-fast: a start-up that cannot reach every servo must be
//! treated as failed in its entirety. Disable runs to completion across
//! the whole set, collecting errors along the way, because shutdown must
//! release holding torque on every servo it can still reach.

use core::fmt;

use heapless::Vec;

use crate::bus::{DeviceError, DeviceProtocol, Register, ServoId};
use crate::config::MAX_SERVOS;
use crate::telemetry::{EventSink, MotionEvent};

/// Register value that engages holding torque.
pub const TORQUE_ENABLE: u32 = 1;
/// Register value that releases holding torque.
pub const TORQUE_DISABLE: u32 = 0;

/// Torque write that failed for one servo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TorqueFailure {
    pub id: ServoId,
    pub error: DeviceError,
}

impl fmt::Display for TorqueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={} {}", self.id, self.error)
    }
}

/// Drives the torque-enable register across a servo set.
#[derive(Copy, Clone, Debug)]
pub struct TorqueControl {
    register: Register,
}

impl TorqueControl {
    /// Creates a controller for the given torque-enable register.
    #[must_use]
    pub const fn new(register: Register) -> Self {
        Self { register }
    }

    /// Enables torque on every id in order, aborting at the first failure.
    ///
    /// After a failure the torque state of the ids not yet processed is
    /// unspecified; the caller must treat the whole pass as failed.
    ///
    /// # Errors
    ///
    /// Returns the first failing write. No retries are attempted.
    pub fn enable_all<P, E>(
        &self,
        proto: &mut P,
        ids: &[ServoId],
        events: &mut E,
    ) -> Result<(), TorqueFailure>
    where
        P: DeviceProtocol,
        E: EventSink,
    {
        for &id in ids {
            match proto.write_register(id, self.register, TORQUE_ENABLE) {
                Ok(()) => events.emit(MotionEvent::TorqueEnabled(id)),
                Err(error) => {
                    let failure = TorqueFailure { id, error };
                    events.emit(MotionEvent::TorqueEnableFailed(failure));
                    return Err(failure);
                }
            }
        }
        Ok(())
    }

    /// Disables torque on every id, continuing past individual failures
    /// and collecting each one. Invoked during shutdown and cancellation,
    /// where stopping at the first error would leave torque engaged on
    /// servos the bus can still reach.
    pub fn disable_all<P, E>(
        &self,
        proto: &mut P,
        ids: &[ServoId],
        events: &mut E,
    ) -> Vec<TorqueFailure, MAX_SERVOS>
    where
        P: DeviceProtocol,
        E: EventSink,
    {
        let mut failures = Vec::new();
        for &id in ids {
            match proto.write_register(id, self.register, TORQUE_DISABLE) {
                Ok(()) => events.emit(MotionEvent::TorqueDisabled(id)),
                Err(error) => {
                    let failure = TorqueFailure { id, error };
                    events.emit(MotionEvent::TorqueDisableFailed(failure));
                    failures.push(failure).ok();
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CommError, ModelNumber, SyncEntry};
    use crate::config::DX_TORQUE_ENABLE;
    use crate::telemetry::NullEventSink;

    struct WriteLog {
        writes: Vec<(ServoId, u32), 16>,
        failing_id: Option<ServoId>,
    }

    impl WriteLog {
        fn new(failing_id: Option<ServoId>) -> Self {
            Self {
                writes: Vec::new(),
                failing_id,
            }
        }
    }

    impl DeviceProtocol for WriteLog {
        fn write_register(
            &mut self,
            id: ServoId,
            _: Register,
            value: u32,
        ) -> Result<(), DeviceError> {
            if self.failing_id == Some(id) {
                return Err(DeviceError::Comm(CommError::Timeout));
            }
            self.writes.push((id, value)).expect("write log fits");
            Ok(())
        }

        fn read_register(&mut self, _: ServoId, _: Register) -> Result<u32, DeviceError> {
            Ok(0)
        }

        fn ping(&mut self, _: ServoId) -> Result<ModelNumber, DeviceError> {
            Ok(0)
        }

        fn sync_write(&mut self, _: Register, _: &[SyncEntry]) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[test]
    fn enable_walks_every_servo_in_order() {
        let torque = TorqueControl::new(DX_TORQUE_ENABLE);
        let mut proto = WriteLog::new(None);
        let mut events = NullEventSink;

        torque
            .enable_all(&mut proto, &[1, 2, 3], &mut events)
            .expect("enable succeeds");

        assert_eq!(
            proto.writes.as_slice(),
            &[(1, TORQUE_ENABLE), (2, TORQUE_ENABLE), (3, TORQUE_ENABLE)]
        );
    }

    #[test]
    fn enable_aborts_at_the_first_failure() {
        let torque = TorqueControl::new(DX_TORQUE_ENABLE);
        let mut proto = WriteLog::new(Some(2));
        let mut events = NullEventSink;

        let failure = torque
            .enable_all(&mut proto, &[1, 2, 3], &mut events)
            .expect_err("enable should fail");

        assert_eq!(failure.id, 2);
        // Servo 3 was never written.
        assert_eq!(proto.writes.as_slice(), &[(1, TORQUE_ENABLE)]);
    }

    #[test]
    fn disable_continues_past_failures_and_collects_them() {
        let torque = TorqueControl::new(DX_TORQUE_ENABLE);
        let mut proto = WriteLog::new(Some(2));
        let mut events = NullEventSink;

        let failures = torque.disable_all(&mut proto, &[1, 2, 3], &mut events);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, 2);
        assert_eq!(
            proto.writes.as_slice(),
            &[(1, TORQUE_DISABLE), (3, TORQUE_DISABLE)]
        );
    }
}
