//! Position wire codec.
//!
//! Goal and present-position registers are 32-bit little-endian fields
//! split as low-word-low-byte, low-word-high-byte, high-word-low-byte,
//! high-word-high-byte, even though only the low bits are meaningful for
//! small servo models. Travel-range validation belongs to the sequencer;
//! the codec only rejects values the register cannot represent.

use core::fmt;

/// Raw encoder counts for a commanded or measured servo position.
pub type Position = i32;

/// Number of bytes a position occupies on the wire.
pub const ENCODED_POSITION_LEN: usize = 4;

/// Failure to convert between a logical position and its wire form.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// Commanded position is negative and has no unsigned register form.
    Negative(Position),
    /// Register word decodes above the supported position range.
    Unrepresentable(u32),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Negative(position) => write!(f, "negative position {position}"),
            EncodeError::Unrepresentable(raw) => write!(f, "unrepresentable register word {raw}"),
        }
    }
}

/// Encodes a position into its four-byte little-endian register form.
///
/// # Errors
///
/// Returns [`EncodeError::Negative`] when `position` is below zero.
pub fn encode_position(position: Position) -> Result<[u8; ENCODED_POSITION_LEN], EncodeError> {
    let raw = u32::try_from(position).map_err(|_| EncodeError::Negative(position))?;
    Ok(raw.to_le_bytes())
}

/// Decodes a four-byte register word back into a position.
///
/// Exact inverse of [`encode_position`] for every value that encodes.
///
/// # Errors
///
/// Returns [`EncodeError::Unrepresentable`] when the raw word exceeds the
/// representable position range.
pub fn decode_position(bytes: [u8; ENCODED_POSITION_LEN]) -> Result<Position, EncodeError> {
    let raw = u32::from_le_bytes(bytes);
    Position::try_from(raw).map_err(|_| EncodeError::Unrepresentable(raw))
}
