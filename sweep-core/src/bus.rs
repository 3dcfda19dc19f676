//! Collaborator contracts for the physical servo bus.
//!
//! The controller core never frames a packet or touches a serial port. It
//! drives these traits, and the embedding target (emulator, hardware shell,
//! test mocks) supplies the transport and packet-protocol implementations.
//! A single object may implement both traits; the sequencer only requires
//! that it holds the bus exclusively for the duration of a run.

use core::fmt;

use crate::codec::ENCODED_POSITION_LEN;

/// Bus-unique device identifier. Assigned externally, stable for a run.
pub type ServoId = u8;

/// Largest assignable device id; ids above it are reserved by the protocol
/// for broadcast traffic.
pub const MAX_SERVO_ID: ServoId = 252;

/// Model number a servo reports in response to a ping.
pub type ModelNumber = u16;

/// Width of an addressable device register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterWidth {
    Byte,
    Word,
    DoubleWord,
}

impl RegisterWidth {
    /// Number of bytes the register occupies on the wire.
    #[must_use]
    pub const fn byte_count(self) -> u8 {
        match self {
            RegisterWidth::Byte => 1,
            RegisterWidth::Word => 2,
            RegisterWidth::DoubleWord => 4,
        }
    }
}

/// Address and width of one device register, supplied by configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Register {
    pub address: u8,
    pub width: RegisterWidth,
}

impl Register {
    /// Creates a register descriptor.
    #[must_use]
    pub const fn new(address: u8, width: RegisterWidth) -> Self {
        Self { address, width }
    }
}

/// Failure while acquiring or configuring the bus connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectError {
    /// The underlying channel could not be opened.
    PortUnavailable,
    /// The channel rejected the requested communication rate.
    BaudRateRejected,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Transport-level failure of a single request/response exchange.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommError {
    /// No response arrived within the exchange deadline.
    Timeout,
    /// The request could not be transmitted.
    TxFailed,
    /// The response could not be received.
    RxFailed,
    /// The response arrived but failed validation.
    Corrupt,
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Failure reported for one device exchange.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceError {
    /// The exchange never completed.
    Comm(CommError),
    /// The device answered with an in-band fault code.
    Fault(u8),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Comm(error) => write!(f, "comm {error}"),
            DeviceError::Fault(code) => write!(f, "device fault {code:#04x}"),
        }
    }
}

/// Exclusive handle on the serial-like channel carrying the bus.
pub trait Transport {
    /// Acquires the channel. Failure here is fatal for the whole run.
    fn open(&mut self) -> Result<(), ConnectError>;

    /// Applies the configured communication rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConnectError>;

    /// Releases the channel. Never fails.
    fn close(&mut self);
}

/// One `(id, payload)` entry of a batched goal write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyncEntry {
    pub id: ServoId,
    pub payload: [u8; ENCODED_POSITION_LEN],
}

/// Request/response packet exchanges with individual devices.
///
/// The bus is half-duplex: at most one exchange is outstanding at a time,
/// and every method blocks until its response (or a transport error)
/// arrives. `sync_write` is a single frame carrying payloads for several
/// ids, not a concurrent operation.
pub trait DeviceProtocol {
    /// Writes `value` into a device register.
    fn write_register(
        &mut self,
        id: ServoId,
        register: Register,
        value: u32,
    ) -> Result<(), DeviceError>;

    /// Reads the current value of a device register.
    fn read_register(&mut self, id: ServoId, register: Register) -> Result<u32, DeviceError>;

    /// Probes for a device. Used by discovery tooling that shares the
    /// transport but sits outside the sweep loop.
    fn ping(&mut self, id: ServoId) -> Result<ModelNumber, DeviceError>;

    /// Transmits all entries against `register` as one transaction, in the
    /// given order. Either the whole frame goes out or the call fails; no
    /// partial transmission is observable to the caller.
    fn sync_write(
        &mut self,
        register: Register,
        entries: &[SyncEntry],
    ) -> Result<(), DeviceError>;
}
