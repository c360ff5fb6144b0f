//! # Protocol State Machine
//!
//! Drives a single AudioHook session: applies the authenticator verdict,
//! consumes frames (text control messages or binary audio), enforces the
//! sequence contracts, dispatches per message type, and yields the captured
//! recording when the connection ends.
//!
//! The engine is transport-agnostic: it returns explicit
//! [`EngineOutput`] values instead of writing to a socket, so the WebSocket
//! actor stays a thin adapter and the whole state machine is testable
//! without a connection.
//!
//! ## Dispatch Rules:
//! - An undecodable or unknown-type frame is logged and dropped; the
//!   session survives and the client's sequence counter is not advanced.
//! - A sequence violation is always fatal: one `disconnect(reason=error)`
//!   and nothing of the offending message is processed.
//! - Binary frames are only meaningful while streaming; they are appended
//!   to the sample buffer and never acknowledged.

use crate::protocol::auth::AuthVerdict;
use crate::protocol::media::{select_offered_media, ChannelPolicy};
use crate::protocol::message::{
    parse_client_message, ClientErrorParameters, ClientMessage, ClientMessageBody, DecodeError,
    DisconnectParameters, DisconnectReason, EmptyParameters, OpenParameters, OpenedParameters,
    ServerMessage, ServerMessageBody, PROTOCOL_VERSION,
};
use crate::protocol::session::{Recording, Session, SessionState};
use tracing::{debug, error, info, warn};

/// An effect the transport layer must apply, in order.
#[derive(Debug)]
pub enum EngineOutput {
    /// Serialize and send this control message on the text channel
    Send(ServerMessage),
    /// Close the underlying connection
    Close,
}

/// Per-connection protocol engine. Owns the session exclusively; frames for
/// one connection are handled strictly serially.
pub struct ProtocolEngine {
    session: Option<Session>,
    channel_policy: ChannelPolicy,
}

impl ProtocolEngine {
    pub fn new(channel_policy: ChannelPolicy) -> Self {
        Self {
            session: None,
            channel_policy,
        }
    }

    /// The live session, if authentication promoted this connection to one.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Apply the authenticator verdict. Only `Accepted` leaves a live
    /// session behind; both rejections close the connection, with or
    /// without a diagnostic.
    pub fn begin(&mut self, verdict: AuthVerdict) -> Vec<EngineOutput> {
        match verdict {
            AuthVerdict::Accepted {
                session_id,
                organization_id,
            } => {
                debug!(session_id = %session_id, "New websocket session.");
                let mut session = Session::new(session_id, organization_id);
                session.set_state(SessionState::Negotiating);
                self.session = Some(session);
                Vec::new()
            }
            AuthVerdict::RejectSilently => vec![EngineOutput::Close],
            AuthVerdict::RejectWithDisconnect {
                session_id,
                reason,
                info,
            } => {
                // Short-lived session solely to stamp the disconnect message
                let mut session = Session::new(session_id, String::new());
                let message = send_disconnect(&mut session, reason, info);
                session.set_state(SessionState::Disconnected);
                self.session = Some(session);
                vec![EngineOutput::Send(message), EngineOutput::Close]
            }
        }
    }

    /// Process one inbound text frame.
    pub fn handle_text(&mut self, text: &str) -> Vec<EngineOutput> {
        let policy = self.channel_policy;
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Vec::new(),
        };
        if matches!(
            session.state(),
            SessionState::Disconnected | SessionState::Terminated
        ) {
            return Vec::new();
        }

        let message = match parse_client_message(text) {
            Ok(message) => message,
            Err(DecodeError::UnknownType(tag)) => {
                warn!(session_id = %session.session_id(), r#type = %tag, "Unknown message type from client.");
                return Vec::new();
            }
            Err(DecodeError::Malformed(detail)) => {
                error!(session_id = %session.session_id(), error = %detail, "Failed to decode client message.");
                return Vec::new();
            }
        };

        if let Err(violation) = session.admit_client_seq(message.seq) {
            error!(
                session_id = %session.session_id(),
                expected_client_seq = violation.expected,
                client_seq = violation.received,
                r#type = message.body.message_type(),
                "Incorrect client sequence number."
            );
            let disconnect = send_disconnect(
                session,
                DisconnectReason::Error,
                "Incorrect client sequence number.".to_string(),
            );
            session.set_state(SessionState::Disconnected);
            return vec![EngineOutput::Send(disconnect), EngineOutput::Close];
        }

        debug!(
            session_id = %session.session_id(),
            r#type = message.body.message_type(),
            seq = message.seq,
            serverseq = message.serverseq,
            position = %message.position,
            "Received message from AudioHook client."
        );

        dispatch(session, policy, message)
    }

    /// Process one inbound binary frame: raw audio sample bytes.
    pub fn handle_binary(&mut self, data: &[u8]) {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };
        if session.state() != SessionState::Streaming {
            warn!(
                session_id = %session.session_id(),
                state = session.state().as_str(),
                "Dropping binary frame outside of streaming state."
            );
            return;
        }
        session.append_samples(data);
        if let Some(media) = session.negotiated_media() {
            info!(
                session_id = %session.session_id(),
                samples = session.sample_len(),
                position_secs = session.sample_len() as f64 / media.rate as f64,
                "PCMU samples received."
            );
        }
    }

    /// Tear down the session on connection close.
    ///
    /// Runs on every exit path, abrupt disconnects included. Returns the
    /// captured audio when there is both a negotiated conversation and a
    /// non-empty sample buffer; otherwise the buffer is discarded.
    pub fn finalize(&mut self) -> Option<Recording> {
        let mut session = self.session.take()?;
        session.set_state(SessionState::Terminated);
        session.into_recording()
    }
}

fn dispatch(
    session: &mut Session,
    policy: ChannelPolicy,
    message: ClientMessage,
) -> Vec<EngineOutput> {
    match message.body {
        ClientMessageBody::Open(params) => handle_open(session, policy, params),
        ClientMessageBody::Close(params) => {
            debug!(session_id = %session.session_id(), reason = ?params.reason, "Received \"close\" message from AudioHook client.");
            let closed = send_message(session, ServerMessageBody::Closed(EmptyParameters {}));
            session.set_state(SessionState::Closing);
            vec![EngineOutput::Send(closed)]
        }
        ClientMessageBody::Ping(params) => {
            debug!(session_id = %session.session_id(), rtt = ?params.rtt, "Received \"ping\" message from AudioHook client.");
            let pong = send_message(session, ServerMessageBody::Pong(EmptyParameters {}));
            vec![EngineOutput::Send(pong)]
        }
        ClientMessageBody::Discarded(params) => {
            warn!(
                session_id = %session.session_id(),
                start = %params.start,
                discarded = %params.discarded,
                "Ignoring \"discarded\" message from AudioHook client."
            );
            Vec::new()
        }
        ClientMessageBody::Error(params) => {
            handle_client_error(session, params);
            Vec::new()
        }
        ClientMessageBody::Paused(_) => {
            info!(session_id = %session.session_id(), "Streaming paused.");
            Vec::new()
        }
        ClientMessageBody::Resumed(_) => {
            info!(session_id = %session.session_id(), "Streaming resumed.");
            Vec::new()
        }
    }
}

fn handle_open(
    session: &mut Session,
    policy: ChannelPolicy,
    params: OpenParameters,
) -> Vec<EngineOutput> {
    if session.state() != SessionState::Negotiating {
        warn!(
            session_id = %session.session_id(),
            state = session.state().as_str(),
            "Ignoring \"open\" message outside of negotiation."
        );
        return Vec::new();
    }

    if params.media.is_empty() {
        error!(session_id = %session.session_id(), "Media parameters missing from message.");
        let disconnect = send_disconnect(
            session,
            DisconnectReason::Error,
            "Media parameters missing.".to_string(),
        );
        session.set_state(SessionState::Disconnected);
        return vec![EngineOutput::Send(disconnect), EngineOutput::Close];
    }

    let media = match select_offered_media(&params.media, policy) {
        Some(media) => media.clone(),
        None => {
            error!(session_id = %session.session_id(), offered = params.media.len(), "Unsupported media parameter.");
            let disconnect = send_disconnect(
                session,
                DisconnectReason::Error,
                "Unsupported media parameter.".to_string(),
            );
            session.set_state(SessionState::Disconnected);
            return vec![EngineOutput::Send(disconnect), EngineOutput::Close];
        }
    };

    if let Some(participant) = &params.participant {
        info!(
            conversation_id = %params.conversation_id,
            dnis = %participant.dnis,
            ani = %participant.ani,
            "Incoming audio stream."
        );
    } else {
        info!(conversation_id = %params.conversation_id, "Incoming audio stream.");
    }

    if let Err(err) = session.open_stream(params.conversation_id, media.clone()) {
        // unreachable while the state guard above holds
        error!(session_id = %session.session_id(), error = %err, "Failed to record negotiated stream.");
        return Vec::new();
    }

    let opened = send_message(
        session,
        ServerMessageBody::Opened(OpenedParameters { media: vec![media] }),
    );
    session.set_state(SessionState::Streaming);
    vec![EngineOutput::Send(opened)]
}

fn handle_client_error(session: &Session, params: ClientErrorParameters) {
    error!(
        session_id = %session.session_id(),
        code = params.code,
        message = %params.message,
        retry_after = ?params.retry_after,
        "Received \"error\" message from client."
    );
}

/// Build an outbound message, stamping the next server seq and the last
/// accepted client seq.
fn send_message(session: &mut Session, body: ServerMessageBody) -> ServerMessage {
    ServerMessage {
        version: PROTOCOL_VERSION,
        id: session.session_id().to_string(),
        seq: session.next_server_seq(),
        clientseq: session.client_seq(),
        body,
    }
}

fn send_disconnect(session: &mut Session, reason: DisconnectReason, info: String) -> ServerMessage {
    send_message(
        session,
        ServerMessageBody::Disconnect(DisconnectParameters { reason, info }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::media::{MediaChannel, MediaFormat, MediaType};

    fn accepted_engine() -> ProtocolEngine {
        let mut engine = ProtocolEngine::new(ChannelPolicy::Any);
        let outputs = engine.begin(AuthVerdict::Accepted {
            session_id: "sess-1".to_string(),
            organization_id: "org-123".to_string(),
        });
        assert!(outputs.is_empty());
        engine
    }

    fn open_frame(seq: u64) -> String {
        format!(
            r#"{{"version":"2","id":"sess-1","type":"open","seq":{seq},"serverseq":0,"position":"PT0S",
                "parameters":{{
                    "organizationId":"org-123",
                    "conversationId":"conv-42",
                    "media":[{{"type":"audio","format":"PCMU","rate":8000,"channels":["external","internal"]}}]
                }}}}"#
        )
    }

    fn sent(outputs: &[EngineOutput]) -> Vec<&ServerMessage> {
        outputs
            .iter()
            .filter_map(|o| match o {
                EngineOutput::Send(m) => Some(m),
                EngineOutput::Close => None,
            })
            .collect()
    }

    fn has_close(outputs: &[EngineOutput]) -> bool {
        outputs.iter().any(|o| matches!(o, EngineOutput::Close))
    }

    #[test]
    fn test_open_negotiates_and_echoes_descriptor() {
        let mut engine = accepted_engine();
        let outputs = engine.handle_text(&open_frame(1));

        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(!has_close(&outputs));

        let opened = messages[0];
        assert_eq!(opened.seq, 1);
        assert_eq!(opened.clientseq, 1);
        match &opened.body {
            ServerMessageBody::Opened(params) => {
                assert_eq!(params.media.len(), 1);
                assert_eq!(params.media[0].format, MediaFormat::Pcmu);
                assert_eq!(params.media[0].rate, 8000);
                assert_eq!(
                    params.media[0].channels,
                    vec![MediaChannel::External, MediaChannel::Internal]
                );
            }
            other => panic!("expected opened, got {:?}", other),
        }

        let session = engine.session().unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.conversation_id(), Some("conv-42"));
    }

    #[test]
    fn test_sequence_violation_disconnects_without_dispatch() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1));

        // second message arrives with seq 3 when clientSeq is 1
        let frame = r#"{"version":"2","id":"sess-1","type":"ping","seq":3,"serverseq":1,"position":"PT2S","parameters":{}}"#;
        let outputs = engine.handle_text(frame);

        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(has_close(&outputs));

        let disconnect = messages[0];
        assert_eq!(disconnect.seq, 2);
        assert_eq!(disconnect.clientseq, 1);
        match &disconnect.body {
            ServerMessageBody::Disconnect(params) => {
                assert_eq!(params.reason, DisconnectReason::Error);
                assert_eq!(params.info, "Incorrect client sequence number.");
            }
            other => panic!("expected disconnect, got {:?}", other),
        }

        // session is dead: further frames are ignored
        assert_eq!(
            engine.session().unwrap().state(),
            SessionState::Disconnected
        );
        let frame = r#"{"version":"2","id":"sess-1","type":"ping","seq":2,"serverseq":2,"position":"PT3S","parameters":{}}"#;
        assert!(engine.handle_text(frame).is_empty());
    }

    #[test]
    fn test_unsupported_media_disconnects_and_leaves_media_unset() {
        let mut engine = accepted_engine();
        let frame = r#"{"version":"2","id":"sess-1","type":"open","seq":1,"serverseq":0,"position":"PT0S",
            "parameters":{"conversationId":"conv-42","media":[{"type":"audio","format":"L16","rate":8000,"channels":["external"]}]}}"#;
        let outputs = engine.handle_text(frame);

        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(has_close(&outputs));
        match &messages[0].body {
            ServerMessageBody::Disconnect(params) => {
                assert_eq!(params.reason, DisconnectReason::Error);
                assert_eq!(params.info, "Unsupported media parameter.");
            }
            other => panic!("expected disconnect, got {:?}", other),
        }
        assert!(engine.session().unwrap().negotiated_media().is_none());
    }

    #[test]
    fn test_missing_media_parameters_disconnect() {
        let mut engine = accepted_engine();
        let frame = r#"{"version":"2","id":"sess-1","type":"open","seq":1,"serverseq":0,"position":"PT0S",
            "parameters":{"conversationId":"conv-42","media":[]}}"#;
        let outputs = engine.handle_text(frame);

        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        match &messages[0].body {
            ServerMessageBody::Disconnect(params) => {
                assert_eq!(params.info, "Media parameters missing.");
            }
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_yields_pong_with_incremented_seq() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1)); // server seq 1 used by opened

        let frame = r#"{"version":"2","id":"sess-1","type":"ping","seq":2,"serverseq":1,"position":"PT2S","parameters":{}}"#;
        let outputs = engine.handle_text(frame);
        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].seq, 2);
        assert_eq!(messages[0].clientseq, 2);
        assert!(matches!(messages[0].body, ServerMessageBody::Pong(_)));
    }

    #[test]
    fn test_close_yields_closed_and_enters_closing() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1));

        let frame = r#"{"version":"2","id":"sess-1","type":"close","seq":2,"serverseq":1,"position":"PT10S","parameters":{"reason":"end"}}"#;
        let outputs = engine.handle_text(frame);
        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0].body, ServerMessageBody::Closed(_)));
        assert!(!has_close(&outputs));
        assert_eq!(engine.session().unwrap().state(), SessionState::Closing);
    }

    #[test]
    fn test_informational_messages_produce_no_response() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1));

        let frames = [
            r#"{"version":"2","id":"sess-1","type":"paused","seq":2,"serverseq":1,"position":"PT2S","parameters":{}}"#,
            r#"{"version":"2","id":"sess-1","type":"resumed","seq":3,"serverseq":1,"position":"PT3S","parameters":{}}"#,
            r#"{"version":"2","id":"sess-1","type":"discarded","seq":4,"serverseq":1,"position":"PT4S","parameters":{"start":"PT2S","discarded":"PT1S"}}"#,
            r#"{"version":"2","id":"sess-1","type":"error","seq":5,"serverseq":1,"position":"PT5S","parameters":{"code":500,"message":"client side failure"}}"#,
        ];
        for frame in frames {
            assert!(engine.handle_text(frame).is_empty());
        }
        // still streaming, sequence advanced through all four
        let session = engine.session().unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.client_seq(), 5);
    }

    #[test]
    fn test_decode_failures_do_not_advance_seq_or_kill_session() {
        let mut engine = accepted_engine();

        assert!(engine.handle_text("{{{ not json").is_empty());
        assert!(engine
            .handle_text(r#"{"version":"2","id":"sess-1","type":"update","seq":1,"serverseq":0,"position":"PT0S","parameters":{}}"#)
            .is_empty());

        // the dropped frames consumed nothing: seq 1 still expected
        let outputs = engine.handle_text(&open_frame(1));
        assert_eq!(sent(&outputs).len(), 1);
        assert_eq!(engine.session().unwrap().state(), SessionState::Streaming);
    }

    #[test]
    fn test_binary_frames_append_only_while_streaming() {
        let mut engine = accepted_engine();

        engine.handle_binary(&[1, 2, 3]);
        assert_eq!(engine.session().unwrap().sample_len(), 0);

        engine.handle_text(&open_frame(1));
        engine.handle_binary(&[1, 2, 3]);
        engine.handle_binary(&[4, 5]);
        assert_eq!(engine.session().unwrap().sample_len(), 5);
    }

    #[test]
    fn test_finalize_returns_recording_with_channel_count() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1));
        engine.handle_binary(&[0xffu8; 160]);

        let recording = engine.finalize().expect("recording expected");
        assert_eq!(recording.conversation_id, "conv-42");
        assert_eq!(recording.channels, 2);
        assert_eq!(recording.samples.len(), 160);
        // session is gone
        assert!(engine.session().is_none());
        assert!(engine.finalize().is_none());
    }

    #[test]
    fn test_finalize_without_open_discards_audio() {
        let mut engine = accepted_engine();
        engine.handle_binary(&[0xffu8; 160]); // dropped: not streaming
        assert!(engine.finalize().is_none());
    }

    #[test]
    fn test_reject_with_disconnect_sends_stamped_message() {
        let mut engine = ProtocolEngine::new(ChannelPolicy::Any);
        let outputs = engine.begin(AuthVerdict::RejectWithDisconnect {
            session_id: "sess-1".to_string(),
            reason: DisconnectReason::Unauthorized,
            info: "Invalid key.".to_string(),
        });

        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(has_close(&outputs));
        assert_eq!(messages[0].seq, 1);
        assert_eq!(messages[0].clientseq, 0);
        match &messages[0].body {
            ServerMessageBody::Disconnect(params) => {
                assert_eq!(params.reason, DisconnectReason::Unauthorized);
                assert_eq!(params.info, "Invalid key.");
            }
            other => panic!("expected disconnect, got {:?}", other),
        }
        assert!(engine.finalize().is_none());
    }

    #[test]
    fn test_silent_reject_closes_without_messages() {
        let mut engine = ProtocolEngine::new(ChannelPolicy::Any);
        let outputs = engine.begin(AuthVerdict::RejectSilently);
        assert!(sent(&outputs).is_empty());
        assert!(has_close(&outputs));
        assert!(engine.session().is_none());
    }

    #[test]
    fn test_both_policy_rejects_mono_offer() {
        let mut engine = ProtocolEngine::new(ChannelPolicy::Both);
        engine.begin(AuthVerdict::Accepted {
            session_id: "sess-1".to_string(),
            organization_id: "org-123".to_string(),
        });
        let frame = r#"{"version":"2","id":"sess-1","type":"open","seq":1,"serverseq":0,"position":"PT0S",
            "parameters":{"conversationId":"conv-42","media":[{"type":"audio","format":"PCMU","rate":8000,"channels":["external"]}]}}"#;
        let outputs = engine.handle_text(frame);
        let messages = sent(&outputs);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0].body,
            ServerMessageBody::Disconnect(_)
        ));
    }

    #[test]
    fn test_mono_recording_has_one_channel() {
        let mut engine = accepted_engine();
        let frame = r#"{"version":"2","id":"sess-1","type":"open","seq":1,"serverseq":0,"position":"PT0S",
            "parameters":{"conversationId":"conv-42","media":[{"type":"audio","format":"PCMU","rate":8000,"channels":["external"]}]}}"#;
        engine.handle_text(frame);
        engine.handle_binary(&[0u8; 80]);
        let recording = engine.finalize().unwrap();
        assert_eq!(recording.channels, 1);
    }

    #[test]
    fn test_second_open_is_ignored() {
        let mut engine = accepted_engine();
        engine.handle_text(&open_frame(1));
        let outputs = engine.handle_text(&open_frame(2));
        assert!(outputs.is_empty());
        let media = engine.session().unwrap().negotiated_media().unwrap();
        assert_eq!(media.media_type, MediaType::Audio);
    }
}
