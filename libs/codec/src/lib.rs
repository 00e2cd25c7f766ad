//! # Velo Codec - Wire Protocol Rules
//!
//! ## Purpose
//!
//! Encoding and decoding of the gateway's length-implicit binary frames. The
//! codec is pure and stateless: it maps byte slices to typed
//! [`Message`](velo_types::Message) records and back, reporting exactly how
//! many bytes each frame consumed so callers can drain a streaming buffer.
//!
//! ## Wire Format
//!
//! All integers little-endian, floats as raw IEEE-754 bit patterns:
//!
//! ```text
//! +------+------+------------+------------+------------+-- body --+
//! | type | prio | seq (u64)  | ts (u64)   | cid (u64)  |          |
//! | u8   | u8   |            |            |            |          |
//! +------+------+------------+------------+------------+----------+
//! ```
//!
//! Body layouts per kind:
//! - Order: `order_id u64 | symbol_len u8 | symbol | price f64 | qty u32 | is_buy u8`
//! - MarketData: `symbol_len u8 | symbol | bid f64 | ask f64 | bid_size u32 | ask_size u32`
//! - Heartbeat: empty
//! - Error: `error_code u32 | msg_len u8 | msg`
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling or connection framing loops (gateway's server)
//! - Message validation policy (gateway's interceptor chain)

pub mod error;
pub mod wire;

pub use error::{DecodeError, DecodeResult};
pub use wire::{decode, encode, encode_into, encoded_len, HEADER_LEN, MAX_FRAME_LEN};
