use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{fs, path::Path, path::PathBuf};
use tracing::warn;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = std::env::var("NIGHT_SCRAPE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            data_dir()
                .map(|base| base.join("night-scrape"))
                .unwrap_or_else(|| PathBuf::from("data"))
        });
    if let Err(err) = fs::create_dir_all(&root) {
        warn!(path = %root.display(), error = %err, "failed to create data root");
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn events_path() -> PathBuf {
    data_root().join("events.json")
}

pub fn likes_path() -> PathBuf {
    data_root().join("likes.json")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Writes through a sibling temp file and renames it over `path`, so readers
/// see either the old document or the new one.
pub fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    ensure_parent(path)?;
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
