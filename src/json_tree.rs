//! JSON form of the playlist tree.
//!
//! A group is an object whose `_channels` key holds its channel list and
//! whose other keys are child groups, in order. This is the lossless format.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{Channel, TRANSIENT_KEYS};
use crate::tree::{GroupId, GroupSnapshot, PlaylistTree};

pub const CHANNELS_KEY: &str = "_channels";

pub fn channel_to_json(channel: &Channel) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), Value::String(channel.name.clone()));
    obj.insert(
        "group-title".into(),
        Value::String(channel.group_title.clone()),
    );
    obj.insert("url".into(), Value::String(channel.url.clone()));
    for (key, value) in channel.m3u_attrs() {
        if key != "group-title" {
            obj.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(obj)
}

/// Channel from a JSON object; `None` if it is not an object.
/// Transient display keys are dropped, scalar values are stringified.
pub fn channel_from_json(value: &Value) -> Option<Channel> {
    let obj = value.as_object()?;
    let mut channel = Channel::default();
    for (key, v) in obj {
        if TRANSIENT_KEYS.contains(&key.as_str()) {
            continue;
        }
        let text = match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        channel.set_attr(key, &text);
    }
    Some(channel)
}

fn group_to_json(tree: &PlaylistTree, group: GroupId) -> Value {
    let mut obj = Map::new();
    let channels = tree
        .channels_in(group)
        .iter()
        .filter_map(|id| tree.channel(*id))
        .map(channel_to_json)
        .collect();
    obj.insert(CHANNELS_KEY.into(), Value::Array(channels));
    for child in tree.child_groups(group) {
        if let Some(name) = tree.group_name(*child) {
            obj.insert(name.to_string(), group_to_json(tree, *child));
        }
    }
    Value::Object(obj)
}

pub fn tree_to_value(tree: &PlaylistTree) -> Value {
    group_to_json(tree, tree.root())
}

/// Pretty JSON with 4-space indentation, non-ASCII kept as is
pub fn serialize_json(tree: &PlaylistTree) -> Result<String> {
    to_pretty_string(&tree_to_value(tree))
}

pub fn to_pretty_string(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn snapshot_from_json(obj: &Map<String, Value>) -> GroupSnapshot {
    let mut snapshot = GroupSnapshot::default();
    for (key, value) in obj {
        if key == CHANNELS_KEY {
            if let Some(list) = value.as_array() {
                snapshot
                    .channels
                    .extend(list.iter().filter_map(channel_from_json));
            }
        } else if let Some(child) = value.as_object() {
            snapshot.groups.push((key.clone(), snapshot_from_json(child)));
        } else {
            log::debug!("Ignoring non-group key '{}' in playlist JSON", key);
        }
    }
    snapshot
}

/// Parse the JSON tree form. group-title is re-derived from position.
pub fn parse_json(content: &str) -> Result<PlaylistTree> {
    let value: Value = serde_json::from_str(content)?;
    tree_from_value(&value)
}

pub fn tree_from_value(value: &Value) -> Result<PlaylistTree> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Validation("Playlist JSON must be an object".to_string()))?;
    Ok(PlaylistTree::from_snapshot(&snapshot_from_json(obj)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_layout() {
        let mut tree = PlaylistTree::new();
        tree.add_group::<&str>(&[], "Nöws").unwrap();
        tree.add_channel(&["Nöws"], Channel::new("Ä1", "http://x/1").with_attr("tvg-id", "a"))
            .unwrap();
        let text = serialize_json(&tree).unwrap();
        let expected = r#"{
    "_channels": [],
    "Nöws": {
        "_channels": [
            {
                "name": "Ä1",
                "group-title": "Nöws",
                "url": "http://x/1",
                "tvg-id": "a"
            }
        ]
    }
}"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn test_parse_strips_transient_and_recomputes_title() {
        let text = r#"{
            "Sports": {
                "_channels": [
                    {"name": "ESPN", "url": "http://x/e", "group-title": "Wrong",
                     "_unique_id": "c::Sports::ESPN::http://x/e", "_display_name": "ESPN",
                     "tvg-chno": 5}
                ],
                "Football": {"_channels": []}
            }
        }"#;
        let tree = parse_json(text).unwrap();
        let sports = tree.group_at(&["Sports"]).unwrap();
        let espn = tree.channel(tree.channels_in(sports)[0]).unwrap();
        assert_eq!(espn.group_title, "Sports");
        assert_eq!(espn.tvg_chno, "5");
        assert!(espn.extra.is_empty());
        assert!(tree.group_at(&["Sports", "Football"]).is_some());
    }

    #[test]
    fn test_parse_rejects_non_object_root() {
        assert!(matches!(parse_json("[1, 2]"), Err(Error::Validation(_))));
        assert!(matches!(parse_json("{not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let mut tree = PlaylistTree::new();
        tree.add_group::<&str>(&[], "B").unwrap();
        tree.add_group::<&str>(&[], "A").unwrap();
        tree.add_channel(&["B"], Channel::new("x", "u").with_attr("x-custom", "1"))
            .unwrap();
        let text = serialize_json(&tree).unwrap();
        let back = parse_json(&text).unwrap();
        assert_eq!(back.child_names(back.root()), vec!["B", "A"]);
        assert_eq!(serialize_json(&back).unwrap(), text);
    }
}
