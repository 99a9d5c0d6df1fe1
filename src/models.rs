//! Data models for the playlist manager

use std::collections::BTreeMap;

/// Attributes written on the `#EXTINF` line, in emission order.
pub const M3U_ATTR_ORDER: &[&str] = &[
    "tvg-id",
    "tvg-name",
    "tvg-logo",
    "tvg-url",
    "tvg-shift",
    "radio",
    "catchup",
    "catchup-source",
    "catchup-days",
    "group-title",
];

/// Known attributes that are not part of the fixed emission order.
/// Written right after it so M3U export keeps them.
pub const M3U_EXTRA_KNOWN: &[&str] = &["tvg-country", "tvg-language", "tvg-rec", "tvg-chno"];

/// Keys that only exist while a list is displayed; never persisted.
pub const TRANSIENT_KEYS: &[&str] = &["_unique_id", "_display_name", "item_type"];

/// A single playlist entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub url: String,
    pub tvg_id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub tvg_country: String,
    pub tvg_language: String,
    pub tvg_url: String,
    pub tvg_rec: String,
    pub tvg_chno: String,
    pub tvg_shift: String,
    pub radio: String,
    pub catchup: String,
    pub catchup_source: String,
    pub catchup_days: String,
    /// Derived from the containing group's path, owned by the tree
    pub group_title: String,
    /// Attributes this model has no field for
    pub extra: BTreeMap<String, String>,
}

impl Channel {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    fn slot(&self, key: &str) -> Option<&String> {
        Some(match key {
            "name" => &self.name,
            "url" => &self.url,
            "tvg-id" => &self.tvg_id,
            "tvg-name" => &self.tvg_name,
            "tvg-logo" => &self.tvg_logo,
            "tvg-country" => &self.tvg_country,
            "tvg-language" => &self.tvg_language,
            "tvg-url" => &self.tvg_url,
            "tvg-rec" => &self.tvg_rec,
            "tvg-chno" => &self.tvg_chno,
            "tvg-shift" => &self.tvg_shift,
            "radio" => &self.radio,
            "catchup" => &self.catchup,
            "catchup-source" => &self.catchup_source,
            "catchup-days" => &self.catchup_days,
            "group-title" => &self.group_title,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut String> {
        Some(match key {
            "name" => &mut self.name,
            "url" => &mut self.url,
            "tvg-id" => &mut self.tvg_id,
            "tvg-name" => &mut self.tvg_name,
            "tvg-logo" => &mut self.tvg_logo,
            "tvg-country" => &mut self.tvg_country,
            "tvg-language" => &mut self.tvg_language,
            "tvg-url" => &mut self.tvg_url,
            "tvg-rec" => &mut self.tvg_rec,
            "tvg-chno" => &mut self.tvg_chno,
            "tvg-shift" => &mut self.tvg_shift,
            "radio" => &mut self.radio,
            "catchup" => &mut self.catchup,
            "catchup-source" => &mut self.catchup_source,
            "catchup-days" => &mut self.catchup_days,
            "group-title" => &mut self.group_title,
            _ => return None,
        })
    }

    /// Whether `key` maps onto a dedicated field
    pub fn is_known_attr(key: &str) -> bool {
        Channel::default().slot(key).is_some()
    }

    /// Attribute value by its M3U key. Empty values read as `None`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        let value = match self.slot(key) {
            Some(v) => v.as_str(),
            None => self.extra.get(key)?.as_str(),
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Set an attribute by its M3U key. Transient keys are ignored.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        if TRANSIENT_KEYS.contains(&key) {
            return;
        }
        match self.slot_mut(key) {
            Some(slot) => *slot = value.to_string(),
            None if value.is_empty() => {
                self.extra.remove(key);
            }
            None => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Non-empty attributes in export order: the fixed list, the extra
    /// known attributes, then unknown ones sorted by key.
    pub fn m3u_attrs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for key in M3U_ATTR_ORDER.iter().chain(M3U_EXTRA_KNOWN) {
            if let Some(value) = self.attr(key) {
                out.push((*key, value));
            }
        }
        for (key, value) in &self.extra {
            if !value.is_empty() {
                out.push((key.as_str(), value.as_str()));
            }
        }
        out
    }

    /// Fallback identity used when no arena id or unique id matches
    pub fn same_identity(&self, name: &str, url: &str) -> bool {
        self.name == name && self.url == url
    }
}

/// Kind of row in the displayed list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Back,
    Group,
    Channel,
}

/// Filter used by select/unselect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFilter {
    All,
    Channels,
    Groups,
}

impl ItemFilter {
    pub fn matches(&self, kind: ItemKind) -> bool {
        match self {
            ItemFilter::All => kind != ItemKind::Back,
            ItemFilter::Channels => kind == ItemKind::Channel,
            ItemFilter::Groups => kind == ItemKind::Group,
        }
    }
}

/// Reorder direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_roundtrip_known_and_extra() {
        let mut ch = Channel::new("CNN", "http://x/1");
        ch.set_attr("tvg-id", "cnn.us");
        ch.set_attr("x-custom", "42");
        assert_eq!(ch.attr("tvg-id"), Some("cnn.us"));
        assert_eq!(ch.attr("x-custom"), Some("42"));
        assert_eq!(ch.attr("tvg-logo"), None);

        ch.set_attr("x-custom", "");
        assert!(ch.extra.is_empty());
    }

    #[test]
    fn test_transient_keys_ignored() {
        let mut ch = Channel::new("A", "u");
        ch.set_attr("_unique_id", "abc");
        assert!(ch.extra.is_empty());
    }

    #[test]
    fn test_m3u_attr_order() {
        let ch = Channel::new("A", "u")
            .with_attr("group-title", "News")
            .with_attr("tvg-chno", "7")
            .with_attr("tvg-logo", "l.png")
            .with_attr("tvg-id", "a");
        let keys: Vec<&str> = ch.m3u_attrs().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["tvg-id", "tvg-logo", "group-title", "tvg-chno"]);
    }
}
