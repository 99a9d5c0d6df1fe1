//! JSON script units
//!
//! A script unit is a `*.json` file in the plugins directory:
//!
//! ```json
//! {
//!     "name": "Tools/Logo Host",
//!     "settings": { "host": "http://logos.example" },
//!     "actions": [
//!         {
//!             "label": "Rehost logos",
//!             "steps": [
//!                 { "op": "replace", "field": "tvg-logo", "from": "http://old", "to": "${host}" }
//!             ]
//!         }
//!     ]
//! }
//! ```
//!
//! Steps run over the selected channels and the direct channels of
//! selected groups.

use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;

use super::{Plugin, PluginAction, PluginContext};
use crate::config::{self, Section};
use crate::editor::EditorSession;
use crate::error::{Error, Result};
use crate::models::Channel;

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDef {
    pub name: String,
    #[serde(default)]
    pub settings: Section,
    #[serde(default)]
    pub actions: Vec<ScriptAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptAction {
    pub label: String,
    pub steps: Vec<Step>,
}

/// A single field edit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Set { field: String, value: String },
    Clear { field: String },
    Prefix { field: String, value: String },
    Suffix { field: String, value: String },
    Replace { field: String, from: String, to: String },
}

impl Step {
    pub fn field(&self) -> &str {
        match self {
            Step::Set { field, .. }
            | Step::Clear { field }
            | Step::Prefix { field, .. }
            | Step::Suffix { field, .. }
            | Step::Replace { field, .. } => field,
        }
    }

    fn apply(&self, channel: &mut Channel, settings: &Section) {
        let current = channel.attr(self.field()).unwrap_or_default().to_string();
        let updated = match self {
            Step::Set { value, .. } => expand(value, settings),
            Step::Clear { .. } => String::new(),
            Step::Prefix { value, .. } => format!("{}{}", expand(value, settings), current),
            Step::Suffix { value, .. } => format!("{}{}", current, expand(value, settings)),
            Step::Replace { from, to, .. } => {
                let from = expand(from, settings);
                if from.is_empty() {
                    current
                } else {
                    current.replace(&from, &expand(to, settings))
                }
            }
        };
        channel.set_attr(self.field(), &updated);
    }
}

impl ScriptDef {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let def: ScriptDef = serde_json::from_str(&content)?;
        if def.name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "{}: script unit has no name",
                path.display()
            )));
        }
        for action in &def.actions {
            for step in &action.steps {
                check_field(step.field())?;
            }
        }
        Ok(def)
    }
}

/// Replace `${key}` with the setting of that name. Unknown keys stay as written.
pub fn expand(template: &str, settings: &Section) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match settings.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Fields a bulk edit may touch
pub fn check_field(field: &str) -> Result<()> {
    if field == "group-title" {
        return Err(Error::Validation(
            "group-title follows the containing group and cannot be edited".to_string(),
        ));
    }
    if !Channel::is_known_attr(field) {
        return Err(Error::Validation(format!("Unknown field: {}", field)));
    }
    Ok(())
}

/// Run `steps` over the selection. All edits are checked before any is
/// stored; returns the number of channels touched.
pub fn apply_steps(session: &mut EditorSession, steps: &[Step], settings: &Section) -> Result<usize> {
    for step in steps {
        check_field(step.field())?;
    }
    let targets = session.selected_channel_ids();
    if targets.is_empty() {
        return Err(Error::Validation("No items selected.".to_string()));
    }

    let mut updates = Vec::with_capacity(targets.len());
    for id in targets {
        let Some(original) = session.tree().channel(id) else {
            continue;
        };
        let mut edited = original.clone();
        for step in steps {
            step.apply(&mut edited, settings);
        }
        if edited.name.trim().is_empty() || edited.url.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Edit would leave '{}' without a name or URL",
                original.name
            )));
        }
        updates.push((id, edited));
    }

    let count = updates.len();
    for (id, edited) in updates {
        session.tree_mut().update_channel(id, |ch| *ch = edited);
    }
    session.populate_list();
    Ok(count)
}

/// Plugin backed by a [`ScriptDef`]
pub struct ScriptPlugin {
    def: ScriptDef,
    ctx: PluginContext,
}

impl ScriptPlugin {
    pub fn load(path: &Path, ctx: PluginContext) -> Result<Self> {
        let def = ScriptDef::from_file(path)?;
        Ok(Self { def, ctx })
    }
}

impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn actions(&self) -> Vec<PluginAction> {
        self.def
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PluginAction::new(&a.label, &i.to_string()))
            .collect()
    }

    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()> {
        let index: usize = action
            .parse()
            .map_err(|_| Error::plugin(&self.def.name, format!("unknown action {}", action)))?;
        let script = self
            .def
            .actions
            .get(index)
            .ok_or_else(|| Error::plugin(&self.def.name, format!("unknown action {}", action)))?;
        let settings = self.settings();
        let count = apply_steps(session, &script.steps, &settings)?;
        info!("{}: '{}' updated {} channels", self.def.name, script.label, count);
        Ok(())
    }

    fn has_settings(&self) -> bool {
        !self.def.settings.is_empty()
    }

    fn settings(&self) -> Section {
        self.ctx.settings(&self.def.name, &self.def.settings)
    }

    fn apply_settings(&mut self, values: &Section) -> Result<()> {
        config::lock(&self.ctx.config).set_plugin_settings(&self.def.name, values)
    }
}
