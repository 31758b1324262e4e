// Loads the track catalog from map editor exports on disk.

use crate::domain::{Track, TrackCatalog, TrackError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reads every `*.json` track in `dir`. Unreadable or invalid files are logged and skipped,
/// and a missing directory yields a catalog with only the built-in track.
pub fn load_catalog(dir: &Path, default_id: &str) -> TrackCatalog {
    let paths = match track_files(dir) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "maps directory unavailable; using built-in track");
            Vec::new()
        }
    };

    let mut tracks = Vec::with_capacity(paths.len());
    for path in paths {
        match load_track(&path) {
            Ok(track) => {
                debug!(path = %path.display(), track_id = %track.id, "track loaded");
                tracks.push(track);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping track"),
        }
    }

    let catalog = TrackCatalog::new(tracks, default_id);
    if catalog.default_id() != default_id {
        warn!(
            requested = default_id,
            fallback = catalog.default_id(),
            "default map not found"
        );
    }
    info!(tracks = catalog.len(), default_map = catalog.default_id(), "track catalog ready");
    catalog
}

fn track_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    // Stable load order for logs.
    paths.sort();
    Ok(paths)
}

fn load_track(path: &Path) -> Result<Track, TrackError> {
    let text = std::fs::read_to_string(path)?;
    Track::from_json(&text)
}
