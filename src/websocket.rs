//! # AudioHook WebSocket Endpoint
//!
//! One actor per connection: the upgrade request's headers are run through
//! the [`Authenticator`] and the resulting verdict seeds a
//! [`ProtocolEngine`]. The actor itself stays a thin adapter — every frame
//! goes to the engine, every engine output goes back to the socket — so no
//! protocol state lives on the transport object.
//!
//! Frame handling for one connection is strictly serialized by the actor
//! mailbox; sessions only share the read-only configuration and the media
//! directory. Concurrent writers could collide on an identical conversation
//! id filename; conversation ids are globally unique, so this is an
//! accepted risk rather than a guarded path.

use crate::audio::wav;
use crate::protocol::auth::{AuthVerdict, Authenticator};
use crate::protocol::engine::{EngineOutput, ProtocolEngine};
use crate::protocol::message::ServerMessage;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// WebSocket actor for one AudioHook connection.
pub struct AudioHookWebSocket {
    /// Authenticator verdict, applied when the actor starts
    verdict: Option<AuthVerdict>,

    /// The protocol state machine for this connection
    engine: ProtocolEngine,

    /// Destination directory for finalized recordings
    media_dir: PathBuf,

    /// Shared application state (session counters)
    state: AppState,

    /// Whether this connection was counted as a live session
    counted: bool,
}

impl AudioHookWebSocket {
    fn new(verdict: AuthVerdict, engine: ProtocolEngine, media_dir: PathBuf, state: AppState) -> Self {
        Self {
            verdict: Some(verdict),
            engine,
            media_dir,
            state,
            counted: false,
        }
    }

    /// Write engine outputs back to the socket, in order.
    fn apply_outputs(&mut self, outputs: Vec<EngineOutput>, ctx: &mut ws::WebsocketContext<Self>) {
        for output in outputs {
            match output {
                EngineOutput::Send(message) => self.send_message(message, ctx),
                EngineOutput::Close => {
                    ctx.close(None);
                    ctx.stop();
                }
            }
        }
    }

    fn send_message(&mut self, message: ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&message) {
            Ok(json) => {
                debug!(
                    session_id = %message.id,
                    r#type = message.body.message_type(),
                    seq = message.seq,
                    clientseq = message.clientseq,
                    "Sending message to client."
                );
                ctx.text(json);
            }
            // serialization of well-formed internal state does not fail
            Err(err) => error!(error = %err, "Failed to serialize server message."),
        }
    }

    /// Finalize the session: encode and persist the captured audio, if any.
    /// Runs on every exit path; a failed write is logged and lost, never
    /// propagated.
    fn finalize(&mut self) {
        let recording = match self.engine.finalize() {
            Some(recording) => recording,
            None => return,
        };

        let path = self
            .media_dir
            .join(format!("{}.wav", recording.conversation_id));
        info!(path = %path.display(), samples = recording.samples.len(), "Writing PCMU recording to WAV file.");

        let bytes = wav::encode(
            &recording.samples,
            wav::PCMU_BITS_PER_SAMPLE,
            recording.channels,
            recording.rate,
        );
        let state = self.state.clone();
        tokio::spawn(async move {
            match tokio::fs::write(&path, &bytes).await {
                Ok(()) => {
                    state.recording_written();
                    info!(path = %path.display(), "Recording saved.");
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to save recording WAV file.");
                }
            }
        });
    }
}

impl Actor for AudioHookWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let verdict = match self.verdict.take() {
            Some(verdict) => verdict,
            None => return,
        };
        if matches!(verdict, AuthVerdict::Accepted { .. }) {
            self.state.session_started();
            self.counted = true;
        }
        let outputs = self.engine.begin(verdict);
        self.apply_outputs(outputs, ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if self.counted {
            self.state.session_ended();
        }
        self.finalize();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioHookWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                let outputs = self.engine.handle_text(&text);
                self.apply_outputs(outputs, ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.engine.handle_binary(&data);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(reason = ?reason, "Websocket closed.");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame.");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error.");
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: authenticates the upgrade request and binds
/// the connection to a fresh protocol engine.
pub async fn audiohook_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!(peer = ?req.connection_info().peer_addr(), "New websocket connection request.");

    let config = app_state.get_config();
    let authenticator = Authenticator::new(&config.auth);
    let verdict = authenticator.authenticate(req.headers());

    let engine = ProtocolEngine::new(config.protocol.channel_policy);
    let websocket = AudioHookWebSocket::new(
        verdict,
        engine,
        config.media.dir(),
        app_state.get_ref().clone(),
    );

    ws::start(websocket, &req, stream)
}
