//! # Velo Types - Message Data Model
//!
//! ## Purpose
//!
//! Pure data structures shared by the wire codec and the gateway: message
//! kinds, priorities, header fields, and per-kind bodies. This crate holds no
//! I/O and no protocol logic; encoding rules live in `velo-codec` and policy
//! enforcement lives in the gateway's interceptor chain.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → services/gateway
//!     ↑             ↓              ↓
//! Pure Data    Wire Rules     Connections
//! Structures   Encode/Decode  Pipeline/Dispatch
//! ```
//!
//! ## What This Crate Contains
//! - `MessageType` / `MessagePriority` byte-tagged enums
//! - `Message` with its fixed header fields and `MessageBody` variants
//! - The process-wide monotonic sequence counter

pub mod message;

pub use message::{
    next_sequence, timestamp_now_us, Message, MessageBody, MessagePriority, MessageType,
    MAX_STRING_LEN,
};
