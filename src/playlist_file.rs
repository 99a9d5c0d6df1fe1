//! Reading and writing playlist files

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::json_tree;
use crate::m3u_parser;
use crate::tree::PlaylistTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    M3u,
    Json,
}

impl PlaylistFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "m3u" | "m3u8" => Ok(PlaylistFormat::M3u),
            "json" => Ok(PlaylistFormat::Json),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Parse playlist text: JSON when it starts with `{`, M3U otherwise
pub fn parse_content(content: &str) -> Result<PlaylistTree> {
    let content = content.trim_start_matches('\u{feff}').trim();
    if content.starts_with('{') {
        json_tree::parse_json(content)
    } else {
        Ok(m3u_parser::parse_m3u(content))
    }
}

pub fn load_file(path: &Path) -> Result<PlaylistTree> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let tree = parse_content(&content)?;
    info!(
        "Loaded {} ({} channels, {} groups)",
        path.display(),
        tree.channel_count(),
        tree.group_count()
    );
    Ok(tree)
}

/// Load a file to merge into an open playlist; extension decides what is accepted
pub fn import_file(path: &Path) -> Result<PlaylistTree> {
    PlaylistFormat::from_path(path)?;
    load_file(path)
}

/// Path a save to `path` actually writes: `.m3u` is appended when there is no extension
pub fn resolve_save_path(path: &Path) -> PathBuf {
    if path.extension().is_none() {
        path.with_extension("m3u")
    } else {
        path.to_path_buf()
    }
}

pub fn render(tree: &PlaylistTree, format: PlaylistFormat) -> Result<String> {
    match format {
        PlaylistFormat::M3u => Ok(m3u_parser::serialize_m3u(tree)),
        PlaylistFormat::Json => json_tree::serialize_json(tree),
    }
}

/// Write `tree` to `path` in the format its extension names. Returns the path written.
pub fn save_file(path: &Path, tree: &PlaylistTree) -> Result<PathBuf> {
    let path = resolve_save_path(path);
    let format = PlaylistFormat::from_path(&path)?;
    let text = render(tree, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(&path, text).map_err(|e| Error::io(&path, e))?;
    info!("Saved {} ({} channels)", path.display(), tree.channel_count());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(PlaylistFormat::from_path(Path::new("a.M3U8")).unwrap(), PlaylistFormat::M3u);
        assert_eq!(PlaylistFormat::from_path(Path::new("a.json")).unwrap(), PlaylistFormat::Json);
        assert!(matches!(
            PlaylistFormat::from_path(Path::new("a.txt")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_resolve_save_path_appends_m3u() {
        assert_eq!(resolve_save_path(Path::new("/tmp/list")), PathBuf::from("/tmp/list.m3u"));
        assert_eq!(resolve_save_path(Path::new("/tmp/list.json")), PathBuf::from("/tmp/list.json"));
    }

    #[test]
    fn test_parse_content_sniffs_json() {
        let tree = parse_content("\u{feff}  {\"_channels\": [{\"name\": \"A\", \"url\": \"u\"}]}").unwrap();
        assert_eq!(tree.channel_count(), 1);
        let tree = parse_content("#EXTM3U\n#EXTINF:-1,A\nu\n").unwrap();
        assert_eq!(tree.channel_count(), 1);
    }
}
