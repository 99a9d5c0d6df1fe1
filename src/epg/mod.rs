//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV channel parser used to enrich playlist entries.

mod parser;

// Re-export public types
pub use parser::{load_source, EpgChannel, EpgData, EpgParser};

use crate::models::Channel;

/// Channel fields an EPG entry can fill in
pub const EPG_FIELDS: &[&str] = &["tvg-logo", "tvg-id", "tvg-name", "tvg-url"];

/// Find the EPG entry for a playlist channel: by tvg-id first, then by
/// display name (case-insensitive), trying tvg-name before the channel name.
pub fn match_channel<'a>(epg: &'a EpgData, channel: &Channel) -> Option<&'a EpgChannel> {
    epg.find_by_id(&channel.tvg_id)
        .or_else(|| epg.find_by_name(&channel.tvg_name))
        .or_else(|| epg.find_by_name(&channel.name))
}

/// Value an EPG entry provides for `field`. `tvg-url` is the source itself.
pub fn field_value(entry: &EpgChannel, field: &str, source: &str) -> Option<String> {
    let value = match field {
        "tvg-id" => entry.id.clone(),
        "tvg-name" => entry.name.clone(),
        "tvg-logo" => entry.icon.clone().unwrap_or_default(),
        "tvg-url" => source.to_string(),
        _ => return None,
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Format a timestamp as local datetime YYYY-MM-DD HH:MM
pub fn format_datetime(ts: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => "never".to_string(),
    }
}
