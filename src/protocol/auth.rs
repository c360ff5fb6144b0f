//! # Connection Authentication
//!
//! AudioHook authenticates at connection establishment, before the protocol
//! runs: the upgrade request must carry the session identifier, the
//! organization identifier, and the shared-secret API key. Verification is
//! synchronous header comparison against configured values.
//!
//! A peer that cannot even be identified gets no diagnostic at all; an
//! identified peer that fails verification is told why via a protocol-level
//! `disconnect` before the connection is dropped.

use crate::config::AuthConfig;
use crate::protocol::message::DisconnectReason;
use actix_web::http::header::HeaderMap;
use tracing::{debug, error};

/// Required connection-establishment headers.
pub const SESSION_ID_HEADER: &str = "audiohook-session-id";
pub const ORGANIZATION_ID_HEADER: &str = "audiohook-organization-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Optional diagnostic headers, logged only.
const DIAGNOSTIC_HEADERS: [&str; 4] = [
    "audiohook-correlation-id",
    "signature",
    "signature-input",
    "x-forwarded-for",
];

/// Outcome of header verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    /// All checks passed; a session may be constructed
    Accepted {
        session_id: String,
        organization_id: String,
    },
    /// Peer is unidentifiable; close without any response
    RejectSilently,
    /// Peer is identified but not authorized; tell it why, then close
    RejectWithDisconnect {
        session_id: String,
        reason: DisconnectReason,
        info: String,
    },
}

/// Validates connection-establishment headers against configured identity.
#[derive(Debug, Clone)]
pub struct Authenticator {
    organization_id: String,
    api_key: String,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            organization_id: config.organization_id.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Verify the upgrade request headers.
    ///
    /// Checks run in order: session id presence, organization id match, API
    /// key match. Only `Accepted` may be followed by session construction.
    pub fn authenticate(&self, headers: &HeaderMap) -> AuthVerdict {
        for name in DIAGNOSTIC_HEADERS {
            if let Some(value) = header_str(headers, name) {
                debug!(header = name, value = value, "Request header.");
            }
        }

        let session_id = match header_str(headers, SESSION_ID_HEADER) {
            Some(id) => id.to_string(),
            None => {
                error!("{} is missing from request headers.", SESSION_ID_HEADER);
                return AuthVerdict::RejectSilently;
            }
        };

        match header_str(headers, ORGANIZATION_ID_HEADER) {
            Some(org_id) if org_id == self.organization_id => {}
            offered => {
                error!(
                    session_id = %session_id,
                    organization_id = ?offered,
                    "{} not accepted.",
                    ORGANIZATION_ID_HEADER
                );
                return AuthVerdict::RejectWithDisconnect {
                    session_id,
                    reason: DisconnectReason::Unauthorized,
                    info: "Organization id not accepted.".to_string(),
                };
            }
        }

        match header_str(headers, API_KEY_HEADER) {
            Some(key) if key == self.api_key => {}
            _ => {
                error!(session_id = %session_id, "Unauthorized connection. Invalid {}.", API_KEY_HEADER);
                return AuthVerdict::RejectWithDisconnect {
                    session_id,
                    reason: DisconnectReason::Unauthorized,
                    info: "Invalid key.".to_string(),
                };
            }
        }

        AuthVerdict::Accepted {
            session_id,
            organization_id: self.organization_id.clone(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}
