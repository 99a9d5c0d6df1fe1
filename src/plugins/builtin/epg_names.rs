//! Remember channel metadata by channel name and restore it later
//!
//! Entries live in a JSON file (`epg_name_data.json` in the data dir by
//! default) mapping a channel name to its attributes, minus name, url and
//! group-title.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::Value;

use crate::config::{self, Section};
use crate::editor::EditorSession;
use crate::error::{Error, Result};
use crate::plugins::{Plugin, PluginAction, PluginContext};

pub const UNIT: &str = "epg_names";
pub const NAME: &str = "Legacy Plugins/Epg-Name Correspondence";
pub const DATA_FILE: &str = "epg_name_data.json";

const SAVE: &str = "save";
const LOAD: &str = "load";
const EDIT: &str = "edit";
const LIST: &str = "list";

/// Keys never stored or restored
const SKIPPED_KEYS: [&str; 3] = ["name", "url", "group-title"];

/// Name-keyed attribute store backed by one JSON file
#[derive(Debug, Clone, Default)]
pub struct NameStore {
    path: PathBuf,
    entries: BTreeMap<String, Section>,
}

impl NameStore {
    /// A missing file is an empty store
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        };
        if !path.exists() {
            return Ok(store);
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let raw: BTreeMap<String, serde_json::Map<String, Value>> = serde_json::from_str(&content)?;
        for (name, fields) in raw {
            let fields = fields
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect();
            store.entries.insert(name, fields);
        }
        debug!("Loaded {} name entries from {}", store.entries.len(), path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content).map_err(|e| Error::io(&self.path, e))
    }

    pub fn get(&self, name: &str) -> Option<&Section> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: &str, fields: Section) {
        let fields = fields
            .into_iter()
            .filter(|(k, _)| !SKIPPED_KEYS.contains(&k.as_str()))
            .collect();
        self.entries.insert(name.to_string(), fields);
    }

    /// Names containing `filter`, case-insensitive
    pub fn names(&self, filter: &str) -> Vec<&str> {
        let filter = filter.to_lowercase();
        self.entries
            .keys()
            .filter(|n| n.to_lowercase().contains(&filter))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `key=value;key=value`. An empty value removes the key.
fn parse_edits(text: &str) -> Result<Vec<(String, String)>> {
    let mut edits = Vec::new();
    for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Validation(format!("Expected key=value, got '{}'", pair)))?;
        let key = key.trim().to_lowercase();
        if key.is_empty() || SKIPPED_KEYS.contains(&key.as_str()) {
            return Err(Error::Validation(format!("Field '{}' cannot be edited here", key)));
        }
        edits.push((key, value.trim().to_string()));
    }
    Ok(edits)
}

pub struct EpgNamesPlugin {
    ctx: PluginContext,
    store: Option<NameStore>,
}

pub fn create(ctx: PluginContext, _probe: bool) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(EpgNamesPlugin { ctx, store: None }))
}

fn defaults() -> Section {
    Section::from([
        (
            "data_file".to_string(),
            config::data_dir().join(DATA_FILE).to_string_lossy().into_owned(),
        ),
        ("filter".to_string(), String::new()),
        ("edit_name".to_string(), String::new()),
        ("edit_fields".to_string(), String::new()),
    ])
}

impl EpgNamesPlugin {
    fn data_file(&self) -> PathBuf {
        PathBuf::from(self.settings().get("data_file").cloned().unwrap_or_default())
    }

    /// Loaded store, reloaded when the configured file changed
    fn store(&mut self) -> Result<&mut NameStore> {
        let path = self.data_file();
        if self.store.as_ref().map(|s| s.path() != path.as_path()).unwrap_or(true) {
            self.store = Some(NameStore::load(&path)?);
        }
        self.store
            .as_mut()
            .ok_or_else(|| Error::plugin(UNIT, "store not loaded"))
    }

    fn save_selected(&mut self, session: &mut EditorSession) -> Result<()> {
        let targets = session.selected_channel_ids();
        if targets.is_empty() {
            return Err(Error::Validation("No items selected.".to_string()));
        }
        let store = self.store()?;
        let mut count = 0;
        for id in targets {
            let Some(channel) = session.tree().channel(id) else {
                continue;
            };
            let fields: Section = channel
                .m3u_attrs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            store.insert(&channel.name, fields);
            count += 1;
        }
        store.save()?;
        info!("Saved name data for {} channels to {}", count, store.path().display());
        session.notify("Epg-Name Correspondence", format!("Saved {} channels.", count));
        Ok(())
    }

    fn load_selected(&mut self, session: &mut EditorSession) -> Result<()> {
        let targets = session.selected_channel_ids();
        if targets.is_empty() {
            return Err(Error::Validation("No items selected.".to_string()));
        }
        let store = self.store()?.clone();
        let mut count = 0;
        for id in targets {
            let Some(fields) = session
                .tree()
                .channel(id)
                .and_then(|ch| store.get(&ch.name))
            else {
                continue;
            };
            let updated = session.tree_mut().update_channel(id, |ch| {
                for (key, value) in fields {
                    if !SKIPPED_KEYS.contains(&key.as_str()) {
                        ch.set_attr(key, value);
                    }
                }
            });
            if updated {
                count += 1;
            }
        }
        session.populate_list();
        session.notify("Epg-Name Correspondence", format!("Loaded data into {} channels.", count));
        Ok(())
    }

    fn edit(&mut self, session: &mut EditorSession) -> Result<()> {
        let settings = self.settings();
        let name = settings.get("edit_name").cloned().unwrap_or_default();
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Set edit_name to the entry to edit.".to_string()));
        }
        let edits = parse_edits(settings.get("edit_fields").map(String::as_str).unwrap_or_default())?;

        let store = self.store()?;
        let mut fields = store
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("name entry '{}'", name)))?;
        for (key, value) in edits {
            if value.is_empty() {
                fields.remove(&key);
            } else {
                fields.insert(key, value);
            }
        }
        store.insert(name, fields);
        store.save()?;
        session.notify("Epg-Name Correspondence", format!("Data updated for {}", name));
        Ok(())
    }

    fn list(&mut self, session: &mut EditorSession) -> Result<()> {
        let filter = self.settings().get("filter").cloned().unwrap_or_default();
        let store = self.store()?;
        let names = store.names(filter.trim());
        let message = if names.is_empty() {
            "No entries.".to_string()
        } else {
            names.join("\n")
        };
        session.notify("Epg-Name Correspondence", message);
        Ok(())
    }
}

impl Plugin for EpgNamesPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn actions(&self) -> Vec<PluginAction> {
        vec![
            PluginAction::new("Save selected channels data", SAVE),
            PluginAction::new("Load selected channels data", LOAD),
            PluginAction::new("Edit correspondence", EDIT),
            PluginAction::new("List correspondences", LIST),
        ]
    }

    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()> {
        match action {
            SAVE => self.save_selected(session),
            LOAD => self.load_selected(session),
            EDIT => self.edit(session),
            LIST => self.list(session),
            other => Err(Error::plugin(UNIT, format!("unknown action {}", other))),
        }
    }

    fn activate(&mut self) -> Result<()> {
        let count = self.store()?.len();
        debug!("{} name entries available", count);
        Ok(())
    }

    fn has_settings(&self) -> bool {
        true
    }

    fn settings(&self) -> Section {
        self.ctx.settings(NAME, &defaults())
    }

    fn apply_settings(&mut self, values: &Section) -> Result<()> {
        if let Some(file) = values.get("data_file") {
            let file = file.trim();
            if file.is_empty() {
                return Err(Error::Validation("data_file cannot be empty".to_string()));
            }
            self.store = Some(NameStore::load(Path::new(file))?);
        }
        if let Some(fields) = values.get("edit_fields") {
            parse_edits(fields)?;
        }
        config::lock(&self.ctx.config).set_plugin_settings(NAME, values)
    }
}
