//! Run configuration for the sweep controller.
//!
//! Register addresses, widths, travel limits, and the waypoint cycle are
//! device knowledge owned by the embedder; the core receives them here and
//! never hardcodes a control-table constant. The `dx_*` values reproduce
//! the control table of DX-class protocol-1 servos.

use core::fmt;
use core::num::NonZeroU16;

use heapless::Vec;

use crate::bus::{Register, RegisterWidth, ServoId};
use crate::codec::Position;

/// Maximum servos one controller instance drives.
pub const MAX_SERVOS: usize = 8;

/// Maximum entries in the waypoint cycle.
pub const MAX_WAYPOINTS: usize = 8;

/// Torque-enable register of DX-class servos.
pub const DX_TORQUE_ENABLE: Register = Register::new(24, RegisterWidth::Byte);
/// Goal-position register of DX-class servos.
pub const DX_GOAL_POSITION: Register = Register::new(30, RegisterWidth::DoubleWord);
/// Present-position register of DX-class servos.
pub const DX_PRESENT_POSITION: Register = Register::new(36, RegisterWidth::DoubleWord);
/// Factory communication rate of DX-class servos.
pub const DX_BAUD_RATE: u32 = 57_600;
/// Full travel of a 10-bit position register.
pub const DX_TRAVEL: PositionRange = PositionRange::new(0, 1023);
/// Present-position error below which a servo counts as arrived.
pub const DX_MOVING_THRESHOLD: u16 = 10;

/// Control-table locations for the three registers the controller touches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegisterMap {
    pub torque_enable: Register,
    pub goal_position: Register,
    pub present_position: Register,
}

impl RegisterMap {
    /// Register map of DX-class servos.
    #[must_use]
    pub const fn dx() -> Self {
        Self {
            torque_enable: DX_TORQUE_ENABLE,
            goal_position: DX_GOAL_POSITION,
            present_position: DX_PRESENT_POSITION,
        }
    }
}

/// Closed travel range of a servo model, in raw encoder counts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PositionRange {
    pub min: Position,
    pub max: Position,
}

impl PositionRange {
    /// Creates a closed range.
    #[must_use]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Returns `true` when `position` lies inside the range.
    #[must_use]
    pub const fn contains(self, position: Position) -> bool {
        self.min <= position && position <= self.max
    }
}

/// One servo taking part in the sweep.
///
/// `scale_divisor` derives the servo's goal from the commanded waypoint by
/// integer division; the primary servo uses a divisor of one, secondary
/// servos move a proportional fraction of the commanded travel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ServoSpec {
    pub id: ServoId,
    pub scale_divisor: NonZeroU16,
}

impl ServoSpec {
    /// Servo that follows the commanded waypoint directly.
    #[must_use]
    pub const fn primary(id: ServoId) -> Self {
        Self {
            id,
            scale_divisor: NonZeroU16::MIN,
        }
    }

    /// Servo that moves to `waypoint / scale_divisor`.
    #[must_use]
    pub const fn scaled(id: ServoId, scale_divisor: NonZeroU16) -> Self {
        Self { id, scale_divisor }
    }

    /// Concrete goal derived from the commanded waypoint value.
    #[must_use]
    pub fn goal_for(self, waypoint: Position) -> Position {
        waypoint / Position::from(self.scale_divisor.get())
    }
}

/// Rejected controller configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The waypoint cycle needs at least two entries to alternate.
    TooFewWaypoints(usize),
    /// A waypoint lies outside the configured travel range.
    WaypointOutsideTravel(Position),
    /// The travel range has `min` above `max`.
    InvertedTravel,
    /// The same servo id appears twice in the servo set.
    DuplicateServo(ServoId),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Everything a sweep run needs to know about its bus and servo set.
#[derive(Clone, Debug)]
pub struct SweepConfig {
    pub baud_rate: u32,
    pub registers: RegisterMap,
    pub travel: PositionRange,
    pub waypoints: Vec<Position, MAX_WAYPOINTS>,
    pub servos: Vec<ServoSpec, MAX_SERVOS>,
    pub tolerance: u16,
}

impl SweepConfig {
    /// Baseline configuration for DX-class servos sweeping full travel
    /// with an empty servo set.
    #[must_use]
    pub fn dx_defaults() -> Self {
        let waypoints = Vec::from_slice(&[DX_TRAVEL.min, DX_TRAVEL.max])
            .expect("waypoint cycle fits its bound");
        Self {
            baud_rate: DX_BAUD_RATE,
            registers: RegisterMap::dx(),
            travel: DX_TRAVEL,
            waypoints,
            servos: Vec::new(),
            tolerance: DX_MOVING_THRESHOLD,
        }
    }

    /// One primary servo sweeping between the travel extremes.
    #[must_use]
    pub fn single_servo(id: ServoId) -> Self {
        let mut config = Self::dx_defaults();
        config
            .servos
            .push(ServoSpec::primary(id))
            .expect("servo set fits its bound");
        config
    }

    /// Three servos moving proportionally: the first follows the waypoint,
    /// the second half of it, the third a third of it.
    #[must_use]
    pub fn servo_trio(ids: [ServoId; 3]) -> Self {
        let mut config = Self::dx_defaults();
        let divisors = [1u16, 2, 3];
        for (id, divisor) in ids.into_iter().zip(divisors) {
            let divisor = NonZeroU16::new(divisor).expect("divisor table is non-zero");
            config
                .servos
                .push(ServoSpec::scaled(id, divisor))
                .expect("servo set fits its bound");
        }
        config
    }

    /// Validates the cross-field invariants the type system cannot carry.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.travel.min > self.travel.max {
            return Err(ConfigError::InvertedTravel);
        }
        if self.waypoints.len() < 2 {
            return Err(ConfigError::TooFewWaypoints(self.waypoints.len()));
        }
        if let Some(outside) = self
            .waypoints
            .iter()
            .find(|waypoint| !self.travel.contains(**waypoint))
        {
            return Err(ConfigError::WaypointOutsideTravel(*outside));
        }
        for (index, servo) in self.servos.iter().enumerate() {
            if self.servos[..index].iter().any(|other| other.id == servo.id) {
                return Err(ConfigError::DuplicateServo(servo.id));
            }
        }
        Ok(())
    }

    /// Servo ids in configuration order.
    #[must_use]
    pub fn servo_ids(&self) -> Vec<ServoId, MAX_SERVOS> {
        self.servos.iter().map(|servo| servo.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_dx_control_table() {
        let config = SweepConfig::dx_defaults();
        assert_eq!(config.registers.torque_enable.address, 24);
        assert_eq!(config.registers.goal_position.address, 30);
        assert_eq!(config.registers.present_position.address, 36);
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.waypoints.as_slice(), &[0, 1023]);
        assert_eq!(config.tolerance, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scaled_goals_use_integer_division() {
        let config = SweepConfig::servo_trio([0, 1, 2]);
        let goals: Vec<Position, MAX_SERVOS> = config
            .servos
            .iter()
            .map(|servo| servo.goal_for(1023))
            .collect();
        assert_eq!(goals.as_slice(), &[1023, 511, 341]);
    }

    #[test]
    fn validate_rejects_short_waypoint_cycles() {
        let mut config = SweepConfig::single_servo(0);
        config.waypoints.truncate(1);
        assert_eq!(config.validate(), Err(ConfigError::TooFewWaypoints(1)));
    }

    #[test]
    fn validate_rejects_waypoints_outside_travel() {
        let mut config = SweepConfig::single_servo(0);
        config.waypoints.clear();
        config
            .waypoints
            .extend_from_slice(&[0, 2048])
            .expect("waypoints fit");
        assert_eq!(
            config.validate(),
            Err(ConfigError::WaypointOutsideTravel(2048))
        );
    }

    #[test]
    fn validate_rejects_duplicate_servo_ids() {
        let mut config = SweepConfig::single_servo(3);
        config
            .servos
            .push(ServoSpec::primary(3))
            .expect("servo set fits");
        assert_eq!(config.validate(), Err(ConfigError::DuplicateServo(3)));
    }

    #[test]
    fn validate_rejects_inverted_travel() {
        let mut config = SweepConfig::single_servo(0);
        config.travel = PositionRange::new(1023, 0);
        assert_eq!(config.validate(), Err(ConfigError::InvertedTravel));
    }
}
