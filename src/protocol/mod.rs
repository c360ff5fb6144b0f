//! # AudioHook Protocol
//!
//! Implements the server side of the AudioHook real-time audio streaming
//! protocol (version 2). A telephony client opens a WebSocket, authenticates
//! via headers, negotiates media parameters with JSON control messages, and
//! streams raw audio as binary frames on the same connection.
//!
//! ## Key Components:
//! - **auth**: Header-based connection authentication
//! - **message**: Control message wire schema and codec
//! - **media**: Accepted media descriptors and negotiation policy
//! - **session**: Per-connection state and sequence-number contracts
//! - **engine**: The protocol state machine driving a single session

pub mod auth;       // Connection-establishment header verification
pub mod engine;     // Per-connection state machine and message dispatch
pub mod media;      // Media descriptor catalog and negotiation
pub mod message;    // Control message types, parsing and serialization
pub mod session;    // Session state, sequence counters, sample buffer
