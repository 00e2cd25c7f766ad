//! Message kinds, priorities, and the tagged message record.
//!
//! Every constructed message draws a sequence number from a process-wide
//! atomic counter and stamps the construction time in microseconds. Decoded
//! messages are rebuilt through [`Message::from_wire`], which preserves the
//! header fields carried on the wire instead of allocating fresh ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// Longest symbol or error text the wire format can carry (u8 length prefix).
pub const MAX_STRING_LEN: usize = 255;

/// Message kinds understood by the gateway.
///
/// Tag values are the leading byte of every frame. `Login` and `Logout` are
/// reserved session-control tags with no wire body; the codec rejects them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive,
)]
#[repr(u8)]
pub enum MessageType {
    OrderNew = 1,
    OrderCancel = 2,
    OrderReplace = 3,
    OrderFill = 4,
    MarketData = 5,
    Heartbeat = 6,
    Login = 7,
    Logout = 8,
    Error = 9,
}

impl MessageType {
    /// Whether this kind carries an order body on the wire.
    pub fn is_order(self) -> bool {
        matches!(
            self,
            MessageType::OrderNew
                | MessageType::OrderCancel
                | MessageType::OrderReplace
                | MessageType::OrderFill
        )
    }
}

/// Delivery priority carried in the second header byte.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive,
)]
#[repr(u8)]
pub enum MessagePriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide sequence number.
///
/// Strictly increasing and never zero; a zero sequence marks a message that
/// was never properly constructed and the validator rejects it.
pub fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Microseconds since the Unix epoch, or 0 if the clock is before the epoch.
pub fn timestamp_now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Kind-specific payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Order entry, cancel, replace, and fill share one body layout.
    Order {
        order_id: u64,
        symbol: String,
        price: f64,
        quantity: u32,
        is_buy: bool,
    },
    /// Top-of-book quote update.
    MarketData {
        symbol: String,
        bid: f64,
        ask: f64,
        bid_size: u32,
        ask_size: u32,
    },
    /// Header-only liveness probe.
    Heartbeat,
    /// Error report with a numeric code and short text.
    Error { code: u32, text: String },
}

/// A tagged message record: fixed header plus a kind-specific body.
///
/// `receive_time` is stamped by the socket reader for latency tracking. It is
/// never serialized and does not participate in equality, so the codec
/// round-trip law `decode(encode(m)) == m` holds for constructed messages.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageType,
    pub priority: MessagePriority,
    pub sequence: u64,
    pub timestamp_us: u64,
    pub client_id: u64,
    pub receive_time: Option<Instant>,
    pub body: MessageBody,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.priority == other.priority
            && self.sequence == other.sequence
            && self.timestamp_us == other.timestamp_us
            && self.client_id == other.client_id
            && self.body == other.body
    }
}

impl Message {
    /// Construct a message with a fresh sequence number and timestamp.
    pub fn new(kind: MessageType, body: MessageBody) -> Self {
        Self {
            kind,
            priority: MessagePriority::default(),
            sequence: next_sequence(),
            timestamp_us: timestamp_now_us(),
            client_id: 0,
            receive_time: None,
            body,
        }
    }

    /// Rebuild a message from header fields carried on the wire.
    ///
    /// Unlike the constructors this allocates no sequence number; the decoder
    /// hands the wire values through untouched.
    pub fn from_wire(
        kind: MessageType,
        priority: MessagePriority,
        sequence: u64,
        timestamp_us: u64,
        client_id: u64,
        body: MessageBody,
    ) -> Self {
        Self {
            kind,
            priority,
            sequence,
            timestamp_us,
            client_id,
            receive_time: None,
            body,
        }
    }

    /// Order entry/cancel/replace/fill message. `kind` must be an order kind.
    pub fn order(
        kind: MessageType,
        order_id: u64,
        symbol: &str,
        price: f64,
        quantity: u32,
        is_buy: bool,
    ) -> Self {
        debug_assert!(kind.is_order());
        Self::new(
            kind,
            MessageBody::Order {
                order_id,
                symbol: clamp_string(symbol),
                price,
                quantity,
                is_buy,
            },
        )
    }

    /// Top-of-book update for one symbol.
    pub fn market_data(symbol: &str, bid: f64, ask: f64, bid_size: u32, ask_size: u32) -> Self {
        Self::new(
            MessageType::MarketData,
            MessageBody::MarketData {
                symbol: clamp_string(symbol),
                bid,
                ask,
                bid_size,
                ask_size,
            },
        )
    }

    /// Header-only heartbeat from the given session.
    pub fn heartbeat(client_id: u64) -> Self {
        Self::new(MessageType::Heartbeat, MessageBody::Heartbeat).with_client_id(client_id)
    }

    /// Error report message.
    pub fn error(code: u32, text: &str) -> Self {
        Self::new(
            MessageType::Error,
            MessageBody::Error {
                code,
                text: clamp_string(text),
            },
        )
    }

    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Symbol of an order or market data body, if the kind carries one.
    pub fn symbol(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Order { symbol, .. } | MessageBody::MarketData { symbol, .. } => {
                Some(symbol)
            }
            _ => None,
        }
    }
}

/// Clamp a string to [`MAX_STRING_LEN`] bytes on a char boundary.
fn clamp_string(s: &str) -> String {
    if s.len() <= MAX_STRING_LEN {
        return s.to_string();
    }
    let mut end = MAX_STRING_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
