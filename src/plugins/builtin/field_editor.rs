//! Set one field to a fixed value on every selected channel

use log::info;

use crate::config::{self, Section};
use crate::editor::EditorSession;
use crate::error::{Error, Result};
use crate::plugins::script::{self, Step};
use crate::plugins::{Plugin, PluginAction, PluginContext};

pub const UNIT: &str = "field_editor";
pub const NAME: &str = "Examples/Data Editor";

const EDIT: &str = "edit";

pub struct FieldEditor {
    ctx: PluginContext,
}

pub fn create(ctx: PluginContext, _probe: bool) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(FieldEditor { ctx }))
}

fn defaults() -> Section {
    Section::from([
        ("field".to_string(), "tvg-logo".to_string()),
        ("value".to_string(), String::new()),
    ])
}

impl Plugin for FieldEditor {
    fn name(&self) -> &str {
        NAME
    }

    fn actions(&self) -> Vec<PluginAction> {
        vec![PluginAction::new("Edit field for selected items", EDIT)]
    }

    fn run(&mut self, action: &str, session: &mut EditorSession) -> Result<()> {
        if action != EDIT {
            return Err(Error::plugin(UNIT, format!("unknown action {}", action)));
        }
        let settings = self.settings();
        let field = settings.get("field").cloned().unwrap_or_default();
        let value = settings.get("value").cloned().unwrap_or_default();
        let step = Step::Set {
            field: field.clone(),
            value,
        };
        let count = script::apply_steps(session, &[step], &Section::new())?;
        info!("Data Editor: set {} on {} channels", field, count);
        session.notify("Data Editor", format!("Updated {} on {} channels", field, count));
        Ok(())
    }

    fn has_settings(&self) -> bool {
        true
    }

    fn settings(&self) -> Section {
        self.ctx.settings(NAME, &defaults())
    }

    fn apply_settings(&mut self, values: &Section) -> Result<()> {
        if let Some(field) = values.get("field") {
            script::check_field(field)?;
        }
        config::lock(&self.ctx.config).set_plugin_settings(NAME, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::{Channel, ItemFilter};

    fn setup() -> (Box<dyn Plugin>, EditorSession) {
        let config = config::shared(AppConfig::in_memory());
        let plugin = create(PluginContext::new(config.clone(), std::env::temp_dir()), false).unwrap();
        let mut session = EditorSession::new(config);
        session.add_group("News").unwrap();
        session
            .tree_mut()
            .add_channel(&["News"], Channel::new("CNN", "http://x/cnn"))
            .unwrap();
        session.add_channel(Channel::new("Top", "http://x/top")).unwrap();
        (plugin, session)
    }

    #[test]
    fn test_sets_field_on_channels_and_group_members() {
        let (mut plugin, mut session) = setup();
        let mut values = Section::new();
        values.insert("field".to_string(), "tvg-id".to_string());
        values.insert("value".to_string(), "same.id".to_string());
        plugin.apply_settings(&values).unwrap();

        session.select_items(true, ItemFilter::All);
        plugin.run(EDIT, &mut session).unwrap();

        let tree = session.tree();
        for id in tree.channels_under(tree.root()) {
            assert_eq!(tree.channel(id).unwrap().tvg_id, "same.id");
        }
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn test_group_title_setting_rejected() {
        let (mut plugin, _) = setup();
        let mut values = Section::new();
        values.insert("field".to_string(), "group-title".to_string());
        assert!(plugin.apply_settings(&values).is_err());
        assert_eq!(plugin.settings()["field"], "tvg-logo");
    }

    #[test]
    fn test_empty_name_rejected() {
        let (mut plugin, mut session) = setup();
        let mut values = Section::new();
        values.insert("field".to_string(), "name".to_string());
        values.insert("value".to_string(), String::new());
        plugin.apply_settings(&values).unwrap();
        session.select_items(true, ItemFilter::Channels);
        assert!(plugin.run(EDIT, &mut session).is_err());
    }
}
