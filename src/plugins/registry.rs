//! Discovery, activation and dispatch of plugin units

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use super::builtin;
use super::install;
use super::script::ScriptPlugin;
use super::{Plugin, PluginAction, PluginContext, PluginFactory};
use crate::config::{self, Section};
use crate::editor::EditorSession;
use crate::error::{Error, Result};
use crate::menu::ActionHandle;

/// Where a unit comes from
#[derive(Clone)]
enum UnitSource {
    Builtin(PluginFactory),
    Script(PathBuf),
}

/// What a probe learned about a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub unit: String,
    pub name: String,
    pub actions: Vec<PluginAction>,
    pub active: bool,
}

struct LoadedUnit {
    unit: String,
    source: UnitSource,
    plugin: Box<dyn Plugin>,
    active: bool,
}

pub struct PluginRegistry {
    ctx: PluginContext,
    directory: PathBuf,
    builtins: Vec<(&'static str, PluginFactory)>,
    units: Vec<LoadedUnit>,
}

impl PluginRegistry {
    pub fn new(ctx: PluginContext, directory: &Path) -> Self {
        Self::with_builtins(ctx, directory, builtin::factories())
    }

    pub fn with_builtins(
        ctx: PluginContext,
        directory: &Path,
        builtins: Vec<(&'static str, PluginFactory)>,
    ) -> Self {
        Self {
            ctx,
            directory: directory.to_path_buf(),
            builtins,
            units: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Candidate units: compiled-in ones, then `*.json` files under the
    /// plugins directory. Files starting with `__` are skipped.
    fn discover(&self) -> Vec<(String, UnitSource)> {
        let mut found: Vec<(String, UnitSource)> = self
            .builtins
            .iter()
            .map(|(unit, factory)| (unit.to_string(), UnitSource::Builtin(*factory)))
            .collect();

        if !self.directory.is_dir() {
            return found;
        }
        let mut scripts: Vec<PathBuf> = WalkDir::new(&self.directory)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| install::is_unit_file(p))
            .collect();
        scripts.sort();

        for path in scripts {
            let Some(unit) = install::unit_name(&path) else {
                continue;
            };
            if found.iter().any(|(u, _)| *u == unit) {
                warn!("Skipping {}: unit '{}' already exists", path.display(), unit);
                continue;
            }
            found.push((unit, UnitSource::Script(path)));
        }
        found
    }

    fn instantiate(&self, unit: &str, source: &UnitSource, probe: bool) -> Result<Box<dyn Plugin>> {
        let plugin: Result<Box<dyn Plugin>> = match source {
            UnitSource::Builtin(factory) => factory(self.ctx.clone(), probe),
            UnitSource::Script(path) => ScriptPlugin::load(path, self.ctx.clone())
                .map(|p| Box::new(p) as Box<dyn Plugin>),
        };
        plugin.map_err(|e| Error::plugin(unit, e))
    }

    /// Probe every unit without activating anything. A unit that fails
    /// to probe is logged and left out.
    pub fn scan(&self) -> Vec<UnitInfo> {
        let enabled = self.enabled_set();
        let mut infos = Vec::new();
        for (unit, source) in self.discover() {
            match self.instantiate(&unit, &source, true) {
                Ok(plugin) => infos.push(UnitInfo {
                    active: enabled.contains(&unit),
                    name: plugin.name().to_string(),
                    actions: plugin.actions(),
                    unit,
                }),
                Err(e) => warn!("Plugin probe failed: {}", e),
            }
        }
        infos
    }

    /// Instantiate every unit and activate the enabled ones.
    /// Returns how many units loaded.
    pub fn load(&mut self) -> usize {
        let enabled = self.enabled_set();
        let mut units = Vec::new();
        for (unit, source) in self.discover() {
            let mut plugin = match self.instantiate(&unit, &source, false) {
                Ok(plugin) => plugin,
                Err(e) => {
                    warn!("Plugin load failed: {}", e);
                    continue;
                }
            };
            let mut active = enabled.contains(&unit);
            if active {
                if let Err(e) = plugin.activate() {
                    warn!("Plugin '{}' failed to activate: {}", unit, e);
                    active = false;
                }
            }
            info!(
                "Plugin {} ({}): {}",
                plugin.name(),
                unit,
                if active { "ACTIVE" } else { "INACTIVE" }
            );
            units.push(LoadedUnit {
                unit,
                source,
                plugin,
                active,
            });
        }
        self.units = units;
        self.units.len()
    }

    fn enabled_set(&self) -> BTreeSet<String> {
        config::lock(&self.ctx.config)
            .enabled_plugins()
            .into_iter()
            .collect()
    }

    fn persist_enabled(&self, enabled: &BTreeSet<String>) -> Result<()> {
        let units: Vec<String> = enabled.iter().cloned().collect();
        config::lock(&self.ctx.config).set_enabled_plugins(&units)
    }

    /// Enable or disable a unit and persist the enabled set
    pub fn toggle(&mut self, unit: &str, active: bool) -> Result<()> {
        let known = self.units.iter().any(|u| u.unit == unit)
            || self.discover().iter().any(|(u, _)| u == unit);
        if !known {
            return Err(Error::NotFound(format!("plugin unit '{}'", unit)));
        }

        let mut enabled = self.enabled_set();
        if active {
            enabled.insert(unit.to_string());
        } else {
            enabled.remove(unit);
        }
        self.persist_enabled(&enabled)?;

        if let Some(loaded) = self.units.iter_mut().find(|u| u.unit == unit) {
            if active && !loaded.active {
                loaded.plugin.activate()?;
            }
            loaded.active = active;
        }
        info!("Plugin {} {}", unit, if active { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Install an archive or unit file into the plugins directory.
    /// Units found stay disabled.
    pub fn install(&mut self, source: &Path) -> Result<Vec<String>> {
        let units = install::install(source, &self.directory)?;
        self.load();
        Ok(units)
    }

    /// Install and add every unit found to the enabled set
    pub fn install_and_enable(&mut self, source: &Path) -> Result<Vec<String>> {
        let units = install::install(source, &self.directory)?;
        let mut enabled = self.enabled_set();
        enabled.extend(units.iter().cloned());
        self.persist_enabled(&enabled)?;
        self.load();
        Ok(units)
    }

    /// Loaded units in discovery order
    pub fn units(&self) -> Vec<UnitInfo> {
        self.units
            .iter()
            .map(|u| UnitInfo {
                unit: u.unit.clone(),
                name: u.plugin.name().to_string(),
                actions: u.plugin.actions(),
                active: u.active,
            })
            .collect()
    }

    /// Active units as (unit, display name, actions), for menu building
    pub fn active_units(&self) -> Vec<(String, String, Vec<PluginAction>)> {
        self.units
            .iter()
            .filter(|u| u.active)
            .map(|u| (u.unit.clone(), u.plugin.name().to_string(), u.plugin.actions()))
            .collect()
    }

    fn active_mut(&mut self, unit: &str) -> Result<&mut LoadedUnit> {
        self.units
            .iter_mut()
            .find(|u| u.unit == unit && u.active)
            .ok_or_else(|| Error::NotFound(format!("active plugin unit '{}'", unit)))
    }

    /// Run a menu action. Failures stay with the action.
    pub fn invoke(&mut self, handle: &ActionHandle, session: &mut EditorSession) -> Result<()> {
        let loaded = self.active_mut(&handle.unit)?;
        info!("Running {} -> {}", loaded.plugin.name(), handle.action);
        loaded
            .plugin
            .run(&handle.action, session)
            .map_err(|e| match e {
                Error::Plugin { .. } | Error::Validation(_) => e,
                other => Error::plugin(&handle.unit, other),
            })
    }

    /// Settings of a unit, `None` when it has no settings view
    pub fn open_settings(&self, unit: &str) -> Result<Option<Section>> {
        let loaded = self
            .units
            .iter()
            .find(|u| u.unit == unit)
            .ok_or_else(|| Error::NotFound(format!("plugin unit '{}'", unit)))?;
        if !loaded.plugin.has_settings() {
            return Ok(None);
        }
        Ok(Some(loaded.plugin.settings()))
    }

    pub fn apply_settings(&mut self, unit: &str, values: &Section) -> Result<()> {
        let loaded = self
            .units
            .iter_mut()
            .find(|u| u.unit == unit)
            .ok_or_else(|| Error::NotFound(format!("plugin unit '{}'", unit)))?;
        if !loaded.plugin.has_settings() {
            return Err(Error::plugin(unit, "has no settings"));
        }
        loaded.plugin.apply_settings(values)
    }

    /// On-disk location of a script unit
    pub fn unit_path(&self, unit: &str) -> Option<&Path> {
        self.units.iter().find(|u| u.unit == unit).and_then(|u| match &u.source {
            UnitSource::Script(path) => Some(path.as_path()),
            UnitSource::Builtin(_) => None,
        })
    }
}
