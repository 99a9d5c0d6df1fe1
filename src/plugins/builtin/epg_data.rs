//! Fill channel metadata from an XMLTV source

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{error, info};

use crate::config::{self, Section};
use crate::download::DownloadConfig;
use crate::editor::EditorSession;
use crate::epg::{self, EpgData, EPG_FIELDS};
use crate::error::{Error, Result};
use crate::plugins::{Plugin, PluginAction, PluginContext};
use crate::tasks::Apply;
use crate::tree::ChannelId;

pub const UNIT: &str = "epg_data";
pub const NAME: &str = "Legacy Plugins/EPG Data Plugin";

const ASSIGN_ALL: &str = "assign_all";
const ASSIGN_PREFIX: &str = "assign:";
const RELOAD: &str = "reload";

/// Channels loaded from one source
struct LoadedEpg {
    source: String,
    data: Arc<EpgData>,
}

type EpgCache = Arc<Mutex<Option<LoadedEpg>>>;

fn lock_cache(cache: &EpgCache) -> MutexGuard<'_, Option<LoadedEpg>> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct EpgDataPlugin {
    ctx: PluginContext,
    cache: EpgCache,
}

pub fn create(ctx: PluginContext, _probe: bool) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(EpgDataPlugin {
        ctx,
        cache: Arc::new(Mutex::new(None)),
    }))
}

fn defaults() -> Section {
    Section::from([
        ("source".to_string(), String::new()),
        ("load_on_start".to_string(), "false".to_string()),
    ])
}

impl EpgDataPlugin {
    fn source(&self) -> Result<String> {
        let source = self.settings().get("source").cloned().unwrap_or_default();
        let source = source.trim().to_string();
        if source.is_empty() {
            return Err(Error::Validation(
                "No EPG source configured. Set one in the plugin settings.".to_string(),
            ));
        }
        Ok(source)
    }

    fn cached(&self, source: &str) -> Option<Arc<EpgData>> {
        lock_cache(&self.cache)
            .as_ref()
            .filter(|loaded| loaded.source == source)
            .map(|loaded| Arc::clone(&loaded.data))
    }

    fn assign(&self, session: &mut EditorSession, fields: Vec<String>) -> Result<()> {
        let source = self.source()?;
        let targets = session.selected_channel_ids();
        if targets.is_empty() {
            return Err(Error::Validation("No items selected.".to_string()));
        }

        if let Some(data) = self.cached(&source) {
            return assign_fields(session, &targets, &fields, &source, &data);
        }

        let cache = Arc::clone(&self.cache);
        session.spawn_background("EPG load", move || {
            let data = Arc::new(epg::load_source(&source, &DownloadConfig::default())?);
            let apply: Apply = Box::new(move |s: &mut EditorSession| {
                *lock_cache(&cache) = Some(LoadedEpg {
                    source: source.clone(),
                    data: Arc::clone(&data),
                });
                assign_fields(s, &targets, &fields, &source, &data)
            });
            Ok(apply)
        });
        Ok(())
    }

    fn reload(&self, session: &mut EditorSession) -> Result<()> {
        let source = self.source()?;
        let cache = Arc::clone(&self.cache);
        session.spawn_detached("EPG reload", move || {
            let data = epg::load_source(&source, &DownloadConfig::default())?;
            let count = data.len();
            let apply: Apply = Box::new(move |s: &mut EditorSession| {
                *lock_cache(&cache) = Some(LoadedEpg {
                    source,
                    data: Arc::new(data),
                });
                s.notify("EPG Data", format!("Loaded {} EPG channels", count));
                Ok(())
            });
            Ok(apply)
        });
        Ok(())
    }
}

/// Copy matching EPG values onto `targets`
fn assign_fields(
    session: &mut EditorSession,
    targets: &[ChannelId],
    fields: &[String],
    source: &str,
    epg: &EpgData,
) -> Result<()> {
    let mut matched = 0;
    for &id in targets {
        let Some(channel) = session.tree().channel(id) else {
            continue;
        };
        let Some(entry) = epg::match_channel(epg, channel) else {
            continue;
        };
        let values: Vec<(String, String)> = fields
            .iter()
            .filter_map(|f| epg::field_value(entry, f, source).map(|v| (f.clone(), v)))
            .collect();
        if session.tree_mut().update_channel(id, |ch| {
            for (field, value) in &values {
                ch.set_attr(field, value);
            }
        }) {
            matched += 1;
        }
    }
    info!("EPG: assigned {:?} to {} of {} channels", fields, matched, targets.len());
    session.populate_list();
    session.notify(
        "EPG Data",
        format!("Matched {} of {} channels", matched, targets.len()),
    );
    Ok(())
}

impl Plugin for EpgDataPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn actions(&self) -> Vec<PluginAction> {
        let mut actions = vec![PluginAction::new("Assign All", ASSIGN_ALL)];
        for field in EPG_FIELDS {
            actions.push(PluginAction::new(
                &format!("Assign.../{}", field),
                &format!("{}{}", ASSIGN_PREFIX, field),
            ));
        }
        actions.push(PluginAction::new("Reload EPG Source", RELOAD));
        actions
    }

    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()> {
        if action == ASSIGN_ALL {
            let fields = EPG_FIELDS.iter().map(|f| f.to_string()).collect();
            return self.assign(session, fields);
        }
        if action == RELOAD {
            return self.reload(session);
        }
        match action.strip_prefix(ASSIGN_PREFIX) {
            Some(field) if EPG_FIELDS.contains(&field) => {
                self.assign(session, vec![field.to_string()])
            }
            _ => Err(Error::plugin(UNIT, format!("unknown action {}", action))),
        }
    }

    /// Preload the source when configured to
    fn activate(&mut self) -> Result<()> {
        let settings = self.settings();
        let load_on_start = matches!(
            settings.get("load_on_start").map(|v| v.to_lowercase()).as_deref(),
            Some("1" | "true" | "yes")
        );
        let Ok(source) = self.source() else {
            return Ok(());
        };
        if !load_on_start {
            return Ok(());
        }

        let cache = Arc::clone(&self.cache);
        thread::spawn(move || match epg::load_source(&source, &DownloadConfig::default()) {
            Ok(data) => {
                info!("EPG preloaded: {} channels from {}", data.len(), source);
                *lock_cache(&cache) = Some(LoadedEpg {
                    source,
                    data: Arc::new(data),
                });
            }
            Err(e) => error!("EPG preload from {} failed: {}", source, e),
        });
        Ok(())
    }

    fn has_settings(&self) -> bool {
        true
    }

    fn settings(&self) -> Section {
        self.ctx.settings(NAME, &defaults())
    }

    fn apply_settings(&mut self, values: &Section) -> Result<()> {
        config::lock(&self.ctx.config).set_plugin_settings(NAME, values)?;
        *lock_cache(&self.cache) = None;
        Ok(())
    }
}
