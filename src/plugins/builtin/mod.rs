//! Units compiled into the binary

pub mod epg_data;
pub mod epg_names;
pub mod field_editor;
pub mod tv_logos;

use super::PluginFactory;

/// Compiled-in units as (unit name, factory)
pub fn factories() -> Vec<(&'static str, PluginFactory)> {
    vec![
        (epg_data::UNIT, epg_data::create as PluginFactory),
        (epg_names::UNIT, epg_names::create as PluginFactory),
        (tv_logos::UNIT, tv_logos::create as PluginFactory),
        (field_editor::UNIT, field_editor::create as PluginFactory),
    ]
}
