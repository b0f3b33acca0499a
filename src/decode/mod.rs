//! Engine Output Decoders
//!
//! Turns the raw byte buffers written by the recognition engine into
//! identity and bank card records. Decoders only borrow the buffer.

pub mod bank;
pub mod cursor;
pub mod identity;

pub use bank::{decode_bank, parse_bank, BankRecord, BankScan};
pub use cursor::ByteCursor;
pub use identity::{decode_identity, parse_identity, IdentityBack, IdentityFront, IdentityRecord};

use crate::error::DecodeError;

/// Slice of `buffer` the engine reported as written
///
/// Non-positive lengths mean the engine found nothing; lengths beyond the
/// buffer are clamped to its capacity.
pub fn engine_output(buffer: &[u8], length: i32) -> Result<&[u8], DecodeError> {
    let len = usize::try_from(length)
        .ok()
        .filter(|&len| len > 0)
        .ok_or(DecodeError::Empty)?;
    Ok(&buffer[..len.min(buffer.len())])
}

/// Bytes before the first NUL, or all of them
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}
