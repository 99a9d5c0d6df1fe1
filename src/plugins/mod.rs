//! Plugin system
//!
//! A plugin contributes named actions to the editor menu. Units come from
//! two places: factories compiled into the binary ([`builtin`]) and JSON
//! script units found in the plugins directory ([`script`]). The
//! [`registry::PluginRegistry`] discovers both, tracks which are enabled and
//! dispatches menu actions to them.

pub mod builtin;
pub mod install;
pub mod registry;
pub mod script;

use std::path::PathBuf;

use crate::config::{self, Section, SharedConfig};
use crate::editor::EditorSession;
use crate::error::Result;

pub use registry::{PluginRegistry, UnitInfo};

/// One entry a plugin contributes to the menu.
/// `/` in the label opens a submenu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginAction {
    pub label: String,
    pub id: String,
}

impl PluginAction {
    pub fn new(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            id: id.to_string(),
        }
    }
}

/// Handles a plugin receives at construction
#[derive(Clone)]
pub struct PluginContext {
    pub config: SharedConfig,
    /// Scratch space for downloaded resources
    pub cache_dir: PathBuf,
}

impl PluginContext {
    pub fn new(config: SharedConfig, cache_dir: PathBuf) -> Self {
        Self { config, cache_dir }
    }

    /// Stored settings for `plugin_name` layered over `defaults`
    pub fn settings(&self, plugin_name: &str, defaults: &Section) -> Section {
        let mut merged = defaults.clone();
        merged.extend(config::lock(&self.config).plugin_settings(plugin_name));
        merged
    }
}

pub trait Plugin: Send {
    /// Display name. `/` segments become menu levels.
    fn name(&self) -> &str;

    fn actions(&self) -> Vec<PluginAction>;

    /// Run the action with the given id against the editor
    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()>;

    /// Called once for enabled units after a full load.
    /// Network or disk heavy setup belongs here, never in the constructor.
    fn activate(&mut self) -> Result<()> {
        Ok(())
    }

    fn has_settings(&self) -> bool {
        false
    }

    /// Current settings, for a settings view to edit
    fn settings(&self) -> Section {
        Section::new()
    }

    /// Store edited settings
    fn apply_settings(&mut self, _values: &Section) -> Result<()> {
        Ok(())
    }
}

/// Builds a unit. `probe` asks for a cheap instance that only has to
/// report its name and actions.
pub type PluginFactory = fn(PluginContext, bool) -> Result<Box<dyn Plugin>>;
