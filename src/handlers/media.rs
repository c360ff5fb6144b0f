//! # Recording Management Endpoints
//!
//! Administrative surface over the media directory: list finalized
//! recordings, delete one by conversation id, and the startup sweep that
//! clears leftovers from a previous run. The files themselves are served
//! statically under `/media`.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::io;
use std::path::Path;
use tracing::debug;

const WAV_EXTENSION: &str = ".wav";

/// One finalized recording as returned by `GET /audio`.
#[derive(Debug, Serialize)]
pub struct AudioFileEntry {
    /// Conversation id (file name without extension)
    pub id: String,
    /// Last-modified timestamp of the file
    pub date: DateTime<Utc>,
    /// Retrieval URL under the static media mount
    pub url: String,
}

/// `GET /audio` — list every finalized recording in the media directory.
pub async fn list_audio_files(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let media_dir = state.get_config().media.dir();

    let mut audio_files = Vec::new();
    let mut entries = tokio::fs::read_dir(&media_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(WAV_EXTENSION) {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        audio_files.push(AudioFileEntry {
            id: name.trim_end_matches(WAV_EXTENSION).to_string(),
            date: DateTime::<Utc>::from(modified),
            url: format!("/media/{}", name),
        });
    }

    Ok(HttpResponse::Ok().json(audio_files))
}

/// `DELETE /audio/{id}` — delete one recording by conversation id.
pub async fn delete_audio_file(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(AppError::BadRequest(format!("Invalid recording id '{}'", id)));
    }

    let media_dir = state.get_config().media.dir();
    let file = media_dir.join(format!("{}{}", id, WAV_EXTENSION));

    match tokio::fs::remove_file(&file).await {
        Ok(()) => {
            debug!(id = %id, "Deleted recording.");
            Ok(HttpResponse::Ok().json(json!({})))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AppError::NotFound(format!(
            "No recording with id '{}'",
            id
        ))),
        Err(err) => Err(err.into()),
    }
}

/// Result of the startup sweep: how many leftovers were removed, and which
/// deletions failed.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: usize,
    pub failures: Vec<(String, io::Error)>,
}

/// Delete every `.wav` left over from a previous run.
///
/// All deletions are awaited before returning; individual failures are
/// collected into the report rather than aborting the sweep.
pub async fn sweep_media_dir(media_dir: &Path) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = tokio::fs::read_dir(media_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(WAV_EXTENSION) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => report.deleted += 1,
            Err(err) => report.failures.push((name, err)),
        }
    }

    Ok(report)
}
