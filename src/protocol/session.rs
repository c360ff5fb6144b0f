//! # Session State and Sequencing
//!
//! One `Session` per WebSocket connection, owned exclusively by that
//! connection's protocol engine and destroyed when the connection closes.
//! It tracks the peer's identity, the negotiated media parameters, both
//! direction's sequence counters, and the accumulated raw audio.
//!
//! ## Sequence Contracts:
//! - The server's `seq` increments by exactly 1 per outbound control
//!   message, starting at 1 for the first message sent.
//! - The first accepted client message must carry `seq` 1, and every
//!   subsequent one the previous accepted value + 1. Anything else is a
//!   protocol violation that terminates the session.
//!
//! ## Resource Note:
//! The sample buffer grows without bound for the session's duration; there
//! is no cap or spill-to-disk. Conversations are expected to be bounded in
//! length by the telephony platform.

use crate::protocol::media::MediaDescriptor;
use std::fmt;

/// Lifecycle state of a session.
///
/// `Disconnected` is absorbing: once the server has sent a `disconnect`,
/// no further frames are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Headers received, authenticator verdict pending
    Connecting,
    /// Authentication passed, session constructed
    Authenticated,
    /// Awaiting the client's `open` message
    Negotiating,
    /// Media negotiated, audio frames accepted
    Streaming,
    /// Client sent `close`, awaiting the connection teardown
    Closing,
    /// Underlying connection fully closed
    Terminated,
    /// Server sent `disconnect`; session is dead
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::Negotiating => "negotiating",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Terminated => "terminated",
            SessionState::Disconnected => "disconnected",
        }
    }
}

/// Inbound sequence check failure. Fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceViolation {
    pub expected: u64,
    pub received: u64,
}

impl fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected client seq {}, received {}",
            self.expected, self.received
        )
    }
}

/// Attempted transition the session's invariants forbid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStateError {
    /// `negotiatedMedia` is set at most once per session
    MediaAlreadyNegotiated,
}

impl fmt::Display for SessionStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStateError::MediaAlreadyNegotiated => {
                write!(f, "media parameters already negotiated for this session")
            }
        }
    }
}

/// Audio captured by a finished session, ready for container encoding.
#[derive(Debug)]
pub struct Recording {
    pub conversation_id: String,
    pub channels: u16,
    pub rate: u32,
    pub samples: Vec<u8>,
}

/// Mutable per-connection protocol state.
#[derive(Debug)]
pub struct Session {
    /// Peer-supplied session identifier, immutable
    session_id: String,
    /// Validated organization identifier
    organization_id: String,
    /// Set once by `open`; `None` means no stream was negotiated (e.g. a
    /// connectivity probe) and audio must never be persisted
    conversation_id: Option<String>,
    /// Accepted media descriptor, immutable once set
    negotiated_media: Option<MediaDescriptor>,
    /// Last sequence number sent by the server
    server_seq: u64,
    /// Last sequence number accepted from the client
    client_seq: u64,
    /// Concatenated raw audio payloads, in arrival order
    samples: Vec<u8>,
    state: SessionState,
}

impl Session {
    pub fn new(session_id: String, organization_id: String) -> Self {
        Self {
            session_id,
            organization_id,
            conversation_id: None,
            negotiated_media: None,
            server_seq: 0,
            client_seq: 0,
            samples: Vec::new(),
            state: SessionState::Authenticated,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn negotiated_media(&self) -> Option<&MediaDescriptor> {
        self.negotiated_media.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn client_seq(&self) -> u64 {
        self.client_seq
    }

    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// Admit an inbound control message's sequence number.
    ///
    /// Accepts exactly `client_seq + 1` and records it; anything else is a
    /// violation and the caller must terminate the session. Runs before any
    /// type-specific handling, so an out-of-order message is never
    /// dispatched.
    pub fn admit_client_seq(&mut self, incoming: u64) -> Result<(), SequenceViolation> {
        let expected = self.client_seq + 1;
        if incoming != expected {
            return Err(SequenceViolation {
                expected,
                received: incoming,
            });
        }
        self.client_seq = incoming;
        Ok(())
    }

    /// Advance the outbound counter and return the seq to stamp on the next
    /// server message. First call returns 1.
    pub fn next_server_seq(&mut self) -> u64 {
        self.server_seq += 1;
        self.server_seq
    }

    /// Record the negotiated stream. Media parameters are immutable once
    /// set; a second `open` is rejected.
    pub fn open_stream(
        &mut self,
        conversation_id: String,
        media: MediaDescriptor,
    ) -> Result<(), SessionStateError> {
        if self.negotiated_media.is_some() {
            return Err(SessionStateError::MediaAlreadyNegotiated);
        }
        self.conversation_id = Some(conversation_id);
        self.negotiated_media = Some(media);
        Ok(())
    }

    /// Append a binary frame's payload to the sample buffer.
    pub fn append_samples(&mut self, data: &[u8]) {
        self.samples.extend_from_slice(data);
    }

    pub fn sample_len(&self) -> usize {
        self.samples.len()
    }

    /// Consume the session and hand back the captured audio, if any.
    ///
    /// Returns `None` when no audio arrived or no conversation was
    /// negotiated (a probe connection); in that case the buffer is
    /// discarded.
    pub fn into_recording(self) -> Option<Recording> {
        let media = self.negotiated_media?;
        let conversation_id = self.conversation_id?;
        if self.samples.is_empty() {
            return None;
        }
        Some(Recording {
            conversation_id,
            channels: media.channel_count(),
            rate: media.rate,
            samples: self.samples,
        })
    }
}
