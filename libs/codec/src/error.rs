//! Frame decoding errors.

use thiserror::Error;

/// Why a byte buffer failed to decode as a message frame.
///
/// `Truncated` doubles as the streaming signal: a reader holding a partial
/// frame sees `Truncated` with `need` beyond the buffered length and waits
/// for more bytes before retrying.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer shorter than the bytes the frame's own layout calls for.
    #[error("truncated frame: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    /// A tag byte that does not map to any wire value. Covers the leading
    /// type byte, the priority byte, and the order side flag.
    #[error("unrecognized tag byte {tag:#04x}")]
    UnknownType { tag: u8 },
}

pub type DecodeResult<T> = Result<T, DecodeError>;
