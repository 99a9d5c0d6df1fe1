//! M3U playlist parser and writer

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::models::Channel;
use crate::tree::{GroupId, PlaylistTree};

/// Parsed playlist plus what the `#EXTM3U` header carried
#[derive(Debug, Clone, Default)]
pub struct M3uPlaylist {
    pub tree: PlaylistTree,
    pub epg_url: Option<String>, // From x-tvg-url in header
}

/// Parse M3U and return the tree with the header EPG URL
pub fn parse_m3u_playlist(content: &str) -> M3uPlaylist {
    let mut playlist = M3uPlaylist::default();

    // Check first line for EPG URL
    if let Some(first_line) = content.trim_start().lines().next() {
        if first_line.starts_with("#EXTM3U") {
            // Extract x-tvg-url="..." or url-tvg="..."
            playlist.epg_url = extract_header_attr(first_line, "x-tvg-url")
                .or_else(|| extract_header_attr(first_line, "url-tvg"));
        }
    }

    playlist.tree = parse_m3u(content);
    playlist
}

/// Extract attribute from #EXTM3U header line
fn extract_header_attr(line: &str, attr_name: &str) -> Option<String> {
    let search = format!("{}=\"", attr_name);
    let start = line.to_lowercase().find(&search)?;
    let rest = line.get(start + search.len()..)?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Parse M3U content into a playlist tree.
///
/// `group-title` is split on `/` and each segment becomes a nested group.
/// A URL line without a preceding `#EXTINF` is dropped.
pub fn parse_m3u(content: &str) -> PlaylistTree {
    let mut tree = PlaylistTree::new();
    let mut pending: Option<Channel> = None;
    let mut ext_group: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf(info));
            ext_group = None;
        } else if let Some(group) = line.strip_prefix("#EXTGRP:") {
            ext_group = Some(group.trim().to_string());
        } else if !line.is_empty() && !line.starts_with('#') {
            // This is a URL line
            let Some(mut channel) = pending.take() else {
                log::debug!("Dropping URL without #EXTINF: {}", line);
                continue;
            };
            channel.url = line.to_string();
            let title = match ext_group.take() {
                Some(g) if channel.group_title.is_empty() => g,
                _ => std::mem::take(&mut channel.group_title),
            };
            let group = group_for_title(&mut tree, &title);
            tree.push_channel(group, channel);
        }
    }

    tree
}

fn group_for_title(tree: &mut PlaylistTree, title: &str) -> GroupId {
    let parts: Vec<&str> = title
        .split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    tree.ensure_path(&parts)
}

/// Build a channel from the text after `#EXTINF:`
fn parse_extinf(info: &str) -> Channel {
    let (attr_part, name) = split_display_name(info);

    let mut attrs = HashMap::new();
    extract_attrs(attr_part, &mut attrs);

    let mut channel = Channel::default();
    for (key, value) in &attrs {
        channel.set_attr(key, value);
    }

    channel.name = match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => channel
            .attr("tvg-id")
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown".to_string()),
    };
    channel
}

/// Split at the last comma outside double quotes
fn split_display_name(info: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut last_comma = None;
    for (i, c) in info.char_indices() {
        match c {
            '\\' if in_quotes => {
                escaped = !escaped;
                continue;
            }
            '"' if !escaped => in_quotes = !in_quotes,
            ',' if !in_quotes => last_comma = Some(i),
            _ => {}
        }
        escaped = false;
    }
    match last_comma {
        Some(pos) => (&info[..pos], Some(&info[pos + 1..])),
        None => (info, None),
    }
}

/// Extract attributes from EXTINF line - handles quoted and unquoted values
fn extract_attrs(info: &str, attrs: &mut HashMap<String, String>) {
    let mut chars = info.chars().peekable();
    let mut at_start = true;

    while chars.peek().is_some() {
        // Skip whitespace and commas
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == ',' {
                chars.next();
            } else {
                break;
            }
        }

        // Skip the duration number at the start (e.g., "-1")
        if at_start {
            at_start = false;
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '-' || c == '.' {
                    chars.next();
                } else {
                    break;
                }
            }
            continue;
        }

        // Collect key until '='
        let mut key = String::new();
        let mut has_value = false;
        while let Some(c) = chars.next() {
            if c == '=' {
                has_value = true;
                break;
            }
            if c.is_whitespace() && !key.is_empty() {
                break;
            }
            key.push(c);
        }

        let key = key.trim().to_lowercase();
        if key.is_empty() || !has_value {
            continue;
        }

        // Get value - check if quoted
        match chars.peek() {
            Some(&'"') => {
                chars.next(); // consume opening quote
                let mut value = String::new();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        break;
                    }
                    // \" and \\ are escapes, any other backslash is literal
                    if c == '\\' {
                        if let Some(&next) = chars.peek() {
                            if next == '"' || next == '\\' {
                                chars.next();
                                value.push(next);
                                continue;
                            }
                        }
                    }
                    value.push(c);
                }
                attrs.insert(key, value);
            }
            Some(_) => {
                // Unquoted value - read until space or comma
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                if !value.is_empty() {
                    attrs.insert(key, value);
                }
            }
            None => {}
        }
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `#EXTINF` line for one channel
pub fn channel_to_extinf(channel: &Channel) -> String {
    let mut line = String::from("#EXTINF:-1");
    for (key, value) in channel.m3u_attrs() {
        let _ = write!(line, " {}=\"{}\"", key, escape_attr(value));
    }
    line.push(',');
    line.push_str(&channel.name);
    line
}

/// Serialize the whole tree. Each group writes its own channels, then
/// recurses into its child groups in order.
pub fn serialize_m3u(tree: &PlaylistTree) -> String {
    let mut out = String::from("#EXTM3U\n");
    write_group(tree, tree.root(), &mut out);
    out
}

fn write_group(tree: &PlaylistTree, group: GroupId, out: &mut String) {
    for id in tree.channels_in(group) {
        if let Some(ch) = tree.channel(*id) {
            out.push_str(&channel_to_extinf(ch));
            out.push('\n');
            out.push_str(&ch.url);
            out.push('\n');
        }
    }
    for child in tree.child_groups(group) {
        write_group(tree, *child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_display_name_ignores_quoted_commas() {
        let (attrs, name) = split_display_name(r#"-1 tvg-name="A, B" group-title="X",Real Name"#);
        assert_eq!(name, Some("Real Name"));
        assert!(attrs.ends_with(r#"group-title="X""#));
    }

    #[test]
    fn test_extract_attrs_mixed() {
        let mut attrs = HashMap::new();
        extract_attrs(r#"-1 TVG-ID=unquoted group-title="Quoted \"G\"""#, &mut attrs);
        assert_eq!(attrs.get("tvg-id").map(String::as_str), Some("unquoted"));
        assert_eq!(attrs.get("group-title").map(String::as_str), Some("Quoted \"G\""));
    }

    #[test]
    fn test_channel_to_extinf_escapes_quotes() {
        let ch = Channel::new("A", "u").with_attr("tvg-name", "say \"hi\"");
        assert_eq!(channel_to_extinf(&ch), r#"#EXTINF:-1 tvg-name="say \"hi\"",A"#);
    }
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod scenario_tests;
