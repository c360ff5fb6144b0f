//! # Application State Management
//!
//! Shared state visible to HTTP handlers and WebSocket sessions. Sessions
//! themselves share no mutable state with each other; everything here is
//! either read-only configuration or simple counters behind a lock.

use crate::config::AppConfig;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all request handlers and session actors.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, read-mostly
    pub config: Arc<RwLock<AppConfig>>,

    /// Connection and recording counters
    pub metrics: Arc<RwLock<SessionMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters reported by the health endpoint.
#[derive(Debug, Default, Clone)]
pub struct SessionMetrics {
    /// WebSocket connections accepted since server start
    pub connections_total: u64,

    /// Currently live AudioHook sessions
    pub active_sessions: u32,

    /// Recordings successfully written to the media directory
    pub recordings_written: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(SessionMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the lock
    /// immediately; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Called when an authenticated session starts.
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.connections_total += 1;
        metrics.active_sessions += 1;
    }

    /// Called when a session's connection fully closes.
    pub fn session_ended(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Called after a recording file lands on disk.
    pub fn recording_written(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.recordings_written += 1;
    }

    pub fn get_metrics_snapshot(&self) -> SessionMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
