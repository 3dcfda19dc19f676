//! Simulated half-duplex servo bus.
//!
//! Stands in for the transport and packet protocol so the sweep controller
//! can run without hardware. Each attached servo slews a bounded step
//! toward its last commanded goal on every present-position read, which is
//! roughly how the real devices appear to a polling controller.

use std::collections::BTreeMap;

use sweep_core::bus::{
    CommError, ConnectError, DeviceError, DeviceProtocol, ModelNumber, Register, ServoId,
    SyncEntry, Transport,
};
use sweep_core::codec::{Position, decode_position};
use sweep_core::config::RegisterMap;

/// Counts a simulated servo moves per present-position read.
const DEFAULT_SLEW_STEP: Position = 180;

/// In-band fault bit for a write outside the valid range.
const FAULT_RANGE: u8 = 0x08;
/// In-band fault bit for an instruction the device does not understand.
const FAULT_INSTRUCTION: u8 = 0x40;

struct SimServo {
    model: ModelNumber,
    present: Position,
    goal: Position,
    torque_enabled: bool,
}

/// Simulated bus: transport and protocol handler in one object.
pub struct SimulatedBus {
    registers: RegisterMap,
    servos: BTreeMap<ServoId, SimServo>,
    open: bool,
    baud_rate: Option<u32>,
    slew_step: Position,
}

impl SimulatedBus {
    /// Creates a closed bus with no servos attached.
    pub fn new(registers: RegisterMap) -> Self {
        Self {
            registers,
            servos: BTreeMap::new(),
            open: false,
            baud_rate: None,
            slew_step: DEFAULT_SLEW_STEP,
        }
    }

    /// Wires a servo onto the bus at the given start position.
    pub fn attach(&mut self, id: ServoId, model: ModelNumber, start: Position) {
        self.servos.insert(
            id,
            SimServo {
                model,
                present: start,
                goal: start,
                torque_enabled: false,
            },
        );
    }

    /// Present position of an attached servo.
    pub fn present(&self, id: ServoId) -> Option<Position> {
        self.servos.get(&id).map(|servo| servo.present)
    }

    /// Communication rate last applied through the transport.
    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    fn check_open(&self) -> Result<(), DeviceError> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::Comm(CommError::TxFailed))
        }
    }

    fn servo_mut(&mut self, id: ServoId) -> Result<&mut SimServo, DeviceError> {
        self.servos
            .get_mut(&id)
            .ok_or(DeviceError::Comm(CommError::Timeout))
    }
}

impl Transport for SimulatedBus {
    fn open(&mut self) -> Result<(), ConnectError> {
        self.open = true;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConnectError> {
        if !self.open {
            return Err(ConnectError::PortUnavailable);
        }
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

impl DeviceProtocol for SimulatedBus {
    fn write_register(
        &mut self,
        id: ServoId,
        register: Register,
        value: u32,
    ) -> Result<(), DeviceError> {
        self.check_open()?;
        let registers = self.registers;
        let servo = self.servo_mut(id)?;
        if register == registers.torque_enable {
            servo.torque_enabled = value != 0;
            Ok(())
        } else if register == registers.goal_position {
            let goal =
                decode_position(value.to_le_bytes()).map_err(|_| DeviceError::Fault(FAULT_RANGE))?;
            servo.goal = goal;
            Ok(())
        } else {
            Err(DeviceError::Fault(FAULT_INSTRUCTION))
        }
    }

    fn read_register(&mut self, id: ServoId, register: Register) -> Result<u32, DeviceError> {
        self.check_open()?;
        let registers = self.registers;
        let slew_step = self.slew_step;
        let servo = self.servo_mut(id)?;
        if register == registers.present_position {
            if servo.torque_enabled {
                let delta = (servo.goal - servo.present).clamp(-slew_step, slew_step);
                servo.present += delta;
            }
            u32::try_from(servo.present).map_err(|_| DeviceError::Fault(FAULT_RANGE))
        } else if register == registers.torque_enable {
            Ok(u32::from(servo.torque_enabled))
        } else if register == registers.goal_position {
            u32::try_from(servo.goal).map_err(|_| DeviceError::Fault(FAULT_RANGE))
        } else {
            Err(DeviceError::Fault(FAULT_INSTRUCTION))
        }
    }

    fn ping(&mut self, id: ServoId) -> Result<ModelNumber, DeviceError> {
        self.check_open()?;
        self.servos
            .get(&id)
            .map(|servo| servo.model)
            .ok_or(DeviceError::Comm(CommError::Timeout))
    }

    fn sync_write(&mut self, register: Register, entries: &[SyncEntry]) -> Result<(), DeviceError> {
        self.check_open()?;
        if register != self.registers.goal_position {
            return Err(DeviceError::Fault(FAULT_INSTRUCTION));
        }
        // Broadcast frame: servos that are not attached simply stay quiet.
        for entry in entries {
            if let Some(servo) = self.servos.get_mut(&entry.id)
                && let Ok(goal) = decode_position(entry.payload)
            {
                servo.goal = goal;
            }
        }
        Ok(())
    }
}
