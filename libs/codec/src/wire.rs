//! Frame encoding and decoding.
//!
//! The decoder consumes exactly the bytes one frame needs and reports the
//! count; length framing on the wire is implicit per message. Bounds are
//! checked before every read so arbitrary input can never panic.

use velo_types::{Message, MessageBody, MessagePriority, MessageType};

use crate::error::{DecodeError, DecodeResult};

/// Fixed header: type, priority, sequence, timestamp, client id.
pub const HEADER_LEN: usize = 26;

/// Largest legal frame: a MarketData message with a 255-byte symbol.
///
/// A buffer at least this long that still fails as truncated cannot be a
/// partial frame; the stream is desynchronized.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + 1 + 255 + 8 + 8 + 4 + 4;

/// Bytes the decoder requires up front for the given kind, or `None` for
/// kinds with no wire body (`Login`, `Logout`).
///
/// Order and MarketData carry the gate values the protocol names; Error's
/// gate is its structural minimum, header plus error code plus the mandatory
/// length byte of an empty message.
fn min_frame_len(kind: MessageType) -> Option<usize> {
    match kind {
        MessageType::OrderNew
        | MessageType::OrderCancel
        | MessageType::OrderReplace
        | MessageType::OrderFill => Some(50),
        MessageType::MarketData => Some(50),
        MessageType::Heartbeat => Some(HEADER_LEN),
        MessageType::Error => Some(HEADER_LEN + 4 + 1),
        MessageType::Login | MessageType::Logout => None,
    }
}

/// Exact encoded size of a message. Deterministic for fixed inputs.
pub fn encoded_len(message: &Message) -> usize {
    HEADER_LEN
        + match &message.body {
            MessageBody::Order { symbol, .. } => 8 + 1 + symbol.len() + 8 + 4 + 1,
            MessageBody::MarketData { symbol, .. } => 1 + symbol.len() + 8 + 8 + 4 + 4,
            MessageBody::Heartbeat => 0,
            MessageBody::Error { text, .. } => 4 + 1 + text.len(),
        }
}

/// Encode a message into a fresh buffer.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(message));
    encode_into(message, &mut out);
    out
}

/// Append a message's frame to `out`.
pub fn encode_into(message: &Message, out: &mut Vec<u8>) {
    out.push(message.kind as u8);
    out.push(message.priority as u8);
    out.extend_from_slice(&message.sequence.to_le_bytes());
    out.extend_from_slice(&message.timestamp_us.to_le_bytes());
    out.extend_from_slice(&message.client_id.to_le_bytes());

    match &message.body {
        MessageBody::Order {
            order_id,
            symbol,
            price,
            quantity,
            is_buy,
        } => {
            out.extend_from_slice(&order_id.to_le_bytes());
            push_string(out, symbol);
            out.extend_from_slice(&price.to_bits().to_le_bytes());
            out.extend_from_slice(&quantity.to_le_bytes());
            out.push(u8::from(*is_buy));
        }
        MessageBody::MarketData {
            symbol,
            bid,
            ask,
            bid_size,
            ask_size,
        } => {
            push_string(out, symbol);
            out.extend_from_slice(&bid.to_bits().to_le_bytes());
            out.extend_from_slice(&ask.to_bits().to_le_bytes());
            out.extend_from_slice(&bid_size.to_le_bytes());
            out.extend_from_slice(&ask_size.to_le_bytes());
        }
        MessageBody::Heartbeat => {}
        MessageBody::Error { code, text } => {
            out.extend_from_slice(&code.to_le_bytes());
            push_string(out, text);
        }
    }
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() <= u8::MAX as usize);
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

/// Decode one frame from the front of `buf`.
///
/// Returns the message and the exact number of bytes consumed. Callers keep
/// any remaining bytes for the next frame. A short buffer yields
/// [`DecodeError::Truncated`]; an unmapped type, priority, or side byte
/// yields [`DecodeError::UnknownType`].
pub fn decode(buf: &[u8]) -> DecodeResult<(Message, usize)> {
    let tag = *buf.first().ok_or(DecodeError::Truncated {
        need: HEADER_LEN,
        got: 0,
    })?;
    let kind = MessageType::try_from(tag).map_err(|_| DecodeError::UnknownType { tag })?;
    let min = min_frame_len(kind).ok_or(DecodeError::UnknownType { tag })?;
    if buf.len() < min {
        return Err(DecodeError::Truncated {
            need: min,
            got: buf.len(),
        });
    }

    let mut cur = Cursor::new(buf);
    cur.skip(1); // kind tag, already read
    let priority_raw = cur.read_u8()?;
    let priority = MessagePriority::try_from(priority_raw)
        .map_err(|_| DecodeError::UnknownType { tag: priority_raw })?;
    let sequence = cur.read_u64()?;
    let timestamp_us = cur.read_u64()?;
    let client_id = cur.read_u64()?;

    let body = match kind {
        MessageType::OrderNew
        | MessageType::OrderCancel
        | MessageType::OrderReplace
        | MessageType::OrderFill => {
            let order_id = cur.read_u64()?;
            let symbol = cur.read_string()?;
            let price = f64::from_bits(cur.read_u64()?);
            let quantity = cur.read_u32()?;
            let is_buy = match cur.read_u8()? {
                0 => false,
                1 => true,
                other => return Err(DecodeError::UnknownType { tag: other }),
            };
            MessageBody::Order {
                order_id,
                symbol,
                price,
                quantity,
                is_buy,
            }
        }
        MessageType::MarketData => {
            let symbol = cur.read_string()?;
            let bid = f64::from_bits(cur.read_u64()?);
            let ask = f64::from_bits(cur.read_u64()?);
            let bid_size = cur.read_u32()?;
            let ask_size = cur.read_u32()?;
            MessageBody::MarketData {
                symbol,
                bid,
                ask,
                bid_size,
                ask_size,
            }
        }
        MessageType::Heartbeat => MessageBody::Heartbeat,
        MessageType::Error => {
            let code = cur.read_u32()?;
            let text = cur.read_string()?;
            MessageBody::Error { code, text }
        }
        // Filtered out by min_frame_len above.
        MessageType::Login | MessageType::Logout => unreachable!(),
    };

    let message = Message::from_wire(kind, priority, sequence, timestamp_us, client_id, body);
    Ok((message, cur.consumed()))
}

/// Bounds-checked reader over a frame buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn consumed(&self) -> usize {
        self.pos
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                need: end,
                got: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> DecodeResult<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_u64(&mut self) -> DecodeResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Length-prefixed string. Rejects bytes that are not valid UTF-8 so a
    /// decoded message always re-encodes to the bytes it came from.
    fn read_string(&mut self) -> DecodeResult<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(e) => Err(DecodeError::UnknownType {
                tag: bytes[e.valid_up_to()],
            }),
        }
    }
}
