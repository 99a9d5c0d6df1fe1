//! Channel logos from the tv-logo/tv-logos repository

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::config::{self, Section};
use crate::download::{self, DownloadConfig};
use crate::editor::EditorSession;
use crate::epg;
use crate::error::{Error, Result};
use crate::plugins::{Plugin, PluginAction, PluginContext};
use crate::tasks::Apply;

pub const UNIT: &str = "tv_logos";
pub const NAME: &str = "Legacy Plugins/GitHub TV Logos";

pub const LOGO_REPO_URL: &str = "https://github.com/tv-logo/tv-logos/archive/refs/heads/master.zip";
pub const GITHUB_BASE_URL: &str = "https://raw.githubusercontent.com/tv-logo/tv-logos/master/";

const UPDATE: &str = "update";
const ASSIGN_LOGO: &str = "assign:tvg-logo";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg"];

/// A logo file inside the extracted repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoEntry {
    pub country: String,
    /// Path relative to the repository root, `/` separated
    pub relative_path: String,
    /// Lowercased file stem
    pub stem: String,
}

impl LogoEntry {
    pub fn url(&self) -> String {
        format!("{}{}", GITHUB_BASE_URL, self.relative_path)
    }
}

pub struct TvLogosPlugin {
    ctx: PluginContext,
}

pub fn create(ctx: PluginContext, _probe: bool) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(TvLogosPlugin { ctx }))
}

fn defaults() -> Section {
    Section::from([
        ("country".to_string(), String::new()),
        ("last_update".to_string(), String::new()),
        ("repository".to_string(), LOGO_REPO_URL.to_string()),
    ])
}

impl TvLogosPlugin {
    fn repo_dir(&self) -> PathBuf {
        self.ctx.cache_dir.join("tv-logos")
    }

    fn update(&self, session: &mut EditorSession) -> Result<()> {
        let repository = self
            .settings()
            .get("repository")
            .cloned()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| LOGO_REPO_URL.to_string());
        let repo_dir = self.repo_dir();
        let cache_dir = self.ctx.cache_dir.clone();
        let shared = self.ctx.config.clone();

        session.spawn_detached("Logo repository update", move || {
            fs::create_dir_all(&cache_dir).map_err(|e| Error::io(&cache_dir, e))?;
            let archive = cache_dir.join("tv-logos.zip");
            if download::is_remote(&repository) {
                download::download_to_file(&repository, &archive, &DownloadConfig::default(), None)?;
            } else {
                fs::copy(&repository, &archive).map_err(|e| Error::io(&repository, e))?;
            }
            let count = extract_logo_archive(&archive, &repo_dir);
            let _ = fs::remove_file(&archive);
            let count = count?;

            let apply: Apply = Box::new(move |s: &mut EditorSession| {
                let now = chrono::Utc::now().timestamp();
                let mut cfg = config::lock(&shared);
                let mut values = cfg.plugin_settings(NAME);
                values.insert("last_update".to_string(), now.to_string());
                cfg.set_plugin_settings(NAME, &values)?;
                drop(cfg);
                s.notify(
                    "TV Logos",
                    format!(
                        "Logo repository updated: {} logos ({})",
                        count,
                        epg::format_datetime(now)
                    ),
                );
                Ok(())
            });
            Ok(apply)
        });
        Ok(())
    }

    fn assign(&self, session: &mut EditorSession) -> Result<()> {
        let country = self.settings().get("country").cloned().unwrap_or_default();
        if country.trim().is_empty() {
            return Err(Error::Validation(
                "Select a country in the plugin settings first".to_string(),
            ));
        }
        let repo_dir = self.repo_dir();
        if !repo_dir.is_dir() {
            return Err(Error::Validation(
                "Logo repository not downloaded. Run 'Update logo repository' first.".to_string(),
            ));
        }
        let targets = session.selected_channel_ids();
        if targets.is_empty() {
            return Err(Error::Validation("No items selected.".to_string()));
        }

        let entries: Vec<LogoEntry> = scan_logos(&repo_dir)
            .into_iter()
            .filter(|e| e.country == country)
            .collect();
        if entries.is_empty() {
            return Err(Error::NotFound(format!("logos for country '{}'", country)));
        }

        let mut matched = 0;
        for &id in &targets {
            let Some(channel) = session.tree().channel(id) else {
                continue;
            };
            let Some(logo) = find_logo(&entries, &channel.name) else {
                debug!("No logo for '{}'", channel.name);
                continue;
            };
            let url = logo.url();
            if session
                .tree_mut()
                .update_channel(id, |ch| ch.set_attr("tvg-logo", &url))
            {
                matched += 1;
            }
        }
        info!("TV logos: {} of {} channels matched in {}", matched, targets.len(), country);
        session.populate_list();
        session.notify(
            "TV Logos",
            format!("Assigned logos to {} of {} channels", matched, targets.len()),
        );
        Ok(())
    }
}

impl Plugin for TvLogosPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn actions(&self) -> Vec<PluginAction> {
        vec![
            PluginAction::new("Update logo repository", UPDATE),
            PluginAction::new("Assign.../tvg-logo", ASSIGN_LOGO),
        ]
    }

    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()> {
        match action {
            UPDATE => self.update(session),
            ASSIGN_LOGO => self.assign(session),
            _ => Err(Error::plugin(UNIT, format!("unknown action {}", action))),
        }
    }

    fn has_settings(&self) -> bool {
        true
    }

    fn settings(&self) -> Section {
        self.ctx.settings(NAME, &defaults())
    }

    fn apply_settings(&mut self, values: &Section) -> Result<()> {
        config::lock(&self.ctx.config).set_plugin_settings(NAME, values)
    }
}

/// Lowercase, runs of anything but ASCII letters and digits become one `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if c == '&' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
            slug.push_str("and-");
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Best logo for a channel name: an exact stem, otherwise the shortest
/// stem that extends the name with a `-` suffix (`cnn` -> `cnn-us`)
pub fn find_logo<'a>(entries: &'a [LogoEntry], channel_name: &str) -> Option<&'a LogoEntry> {
    let slug = slugify(channel_name);
    if slug.is_empty() {
        return None;
    }
    if let Some(exact) = entries.iter().find(|e| e.stem == slug) {
        return Some(exact);
    }
    let prefix = format!("{}-", slug);
    entries
        .iter()
        .filter(|e| e.stem.starts_with(&prefix))
        .min_by_key(|e| e.stem.len())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract the images of a repository zip into `out_dir`, dropping the
/// archive's top-level folder. Replaces any previous extraction.
pub fn extract_logo_archive(zip_path: &Path, out_dir: &Path) -> Result<usize> {
    let file = fs::File::open(zip_path).map_err(|e| Error::io(zip_path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Archive(format!("invalid zip: {}", e)))?;

    if out_dir.exists() {
        fs::remove_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    }
    fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Archive(format!("zip entry error: {}", e)))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let relative: PathBuf = name
            .components()
            .skip(1)
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        if relative.as_os_str().is_empty() || !is_image(&relative) {
            continue;
        }

        let out_path = out_dir.join(&relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = fs::File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::io(&out_path, e))?;
        count += 1;
    }
    info!("Extracted {} logos into {}", count, out_dir.display());
    Ok(count)
}

/// Every logo under `repo_dir`, sorted by country then file name
pub fn scan_logos(repo_dir: &Path) -> Vec<LogoEntry> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(repo_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(repo_dir) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if parts.len() < 2 {
            continue;
        }
        let country = if parts[0] == "countries" && parts.len() > 2 {
            parts[1].clone()
        } else {
            parts[0].clone()
        };
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        entries.push(LogoEntry {
            country,
            relative_path: parts.join("/"),
            stem,
        });
    }
    entries.sort_by(|a, b| {
        (a.country.to_lowercase(), a.stem.as_str()).cmp(&(b.country.to_lowercase(), b.stem.as_str()))
    });
    entries
}
