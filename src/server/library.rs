//! Music library endpoints
//!
//! Stateless lookups against the storage root: stream one named file, or list
//! every file name under the root.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use walkdir::WalkDir;

use super::api::AppState;

#[derive(Debug)]
pub enum LibraryError {
    /// No file name in the request
    NotSpecified,
    /// Name would resolve outside the storage root
    InvalidName(String),
    /// No such file under the storage root
    NotFound(String),
    /// Walking the storage root failed
    Listing(String),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::NotSpecified => write!(f, "File not specified"),
            LibraryError::InvalidName(name) => write!(f, "Invalid file name: {}", name),
            LibraryError::NotFound(_) => write!(f, "File not found"),
            LibraryError::Listing(_) => write!(f, "Unable to list files"),
        }
    }
}

impl std::error::Error for LibraryError {}

impl LibraryError {
    pub fn status(&self) -> StatusCode {
        match self {
            LibraryError::NotSpecified | LibraryError::InvalidName(_) => StatusCode::BAD_REQUEST,
            LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::Listing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LibraryError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Map a requested name to a path under `root`.
///
/// Nested names such as `albums/one.mp3` are allowed; absolute paths and `..`
/// components are not.
pub fn resolve_track(root: &Path, name: &str) -> Result<PathBuf, LibraryError> {
    if name.is_empty() {
        return Err(LibraryError::NotSpecified);
    }

    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || name.contains('\\') {
        return Err(LibraryError::InvalidName(name.to_string()));
    }

    Ok(root.join(relative))
}

/// Names of every regular file below `root`, directories excluded.
///
/// Only the final path component is reported. Entries are sorted by name
/// within each directory.
pub fn list_tracks(root: &Path) -> Result<Vec<String>, LibraryError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| LibraryError::Listing(e.to_string()))?;
        if !entry.file_type().is_dir() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(files)
}

#[derive(Deserialize)]
pub struct TrackQuery {
    file: Option<String>,
}

/// `GET /music?file=NAME`
pub async fn serve_track(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
    request: Request,
) -> Result<Response, LibraryError> {
    let name = query.file.unwrap_or_default();
    let path = resolve_track(&state.music_dir, &name)?;

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            tracing::debug!(file = %name, "Requested track not found");
            return Err(LibraryError::NotFound(name));
        }
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}

/// `GET /music-list`
pub async fn list_music(State(state): State<AppState>) -> Result<Json<Vec<String>>, LibraryError> {
    let root = state.music_dir.clone();

    let files = tokio::task::spawn_blocking(move || list_tracks(&root))
        .await
        .map_err(|e| LibraryError::Listing(e.to_string()))?
        .map_err(|e| {
            tracing::warn!(root = %state.music_dir.display(), error = ?e, "Listing failed");
            e
        })?;

    Ok(Json(files))
}
