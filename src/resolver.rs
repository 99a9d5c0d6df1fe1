//! Maps the references a caller holds (arena ids, unique ids, group keys,
//! raw channel values) back onto nodes of the tree.

use std::collections::HashSet;

use crate::models::Channel;
use crate::tree::{ChannelId, GroupId, PlaylistTree};

/// A channel reference, tried in order: arena id, unique id, `(name, url)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelRef {
    pub id: Option<ChannelId>,
    pub unique_id: Option<String>,
    pub name: String,
    pub url: String,
}

impl ChannelRef {
    pub fn by_id(id: ChannelId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_value(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn from_channel(channel: &Channel) -> Self {
        Self::by_value(&channel.name, &channel.url)
    }
}

/// Anything that can name an item at one level of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    UniqueId(String),
    /// Group by key
    Group(String),
    Channel(ChannelRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Group(GroupId),
    Channel(ChannelId),
}

pub fn group_unique_id(path: &[String], key: &str) -> String {
    format!("g::{}::{}", path.join("/"), key)
}

/// Unique ids of the channels directly in `group`, in display order.
///
/// The id is built from the group path, name and url. When that id is
/// already taken by an earlier sibling, `::n` is appended with the lowest
/// `n` still free, so siblings never share an id.
pub fn channel_unique_ids(tree: &PlaylistTree, group: GroupId) -> Vec<(ChannelId, String)> {
    let prefix = tree.path_of(group).join("/");
    let mut issued: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for id in tree.channels_in(group) {
        let Some(ch) = tree.channel(*id) else {
            continue;
        };
        let base = format!("c::{}::{}::{}", prefix, ch.name, ch.url);
        let mut uid = base.clone();
        let mut n = 0;
        while issued.contains(&uid) {
            n += 1;
            uid = format!("{}::{}", base, n);
        }
        issued.insert(uid.clone());
        out.push((*id, uid));
    }
    out
}

/// Resolve `target` among the direct children of the group at `path`
pub fn resolve<S: AsRef<str>>(tree: &PlaylistTree, path: &[S], target: &NodeRef) -> Option<Resolved> {
    let group = tree.group_at(path)?;
    resolve_in(tree, group, target)
}

pub fn resolve_in(tree: &PlaylistTree, group: GroupId, target: &NodeRef) -> Option<Resolved> {
    match target {
        NodeRef::Group(key) => tree.find_child(group, key).map(Resolved::Group),
        NodeRef::UniqueId(uid) => resolve_unique_id(tree, group, uid),
        NodeRef::Channel(r) => resolve_channel(tree, group, r).map(Resolved::Channel),
    }
}

fn resolve_unique_id(tree: &PlaylistTree, group: GroupId, uid: &str) -> Option<Resolved> {
    if let Some((id, _)) = channel_unique_ids(tree, group)
        .into_iter()
        .find(|(_, u)| u == uid)
    {
        return Some(Resolved::Channel(id));
    }
    let path = tree.path_of(group);
    tree.child_groups(group)
        .iter()
        .copied()
        .find(|g| {
            tree.group_name(*g)
                .map(|name| group_unique_id(&path, name) == uid)
                .unwrap_or(false)
        })
        .map(Resolved::Group)
}

/// Three-tier channel lookup within one group
pub fn resolve_channel(tree: &PlaylistTree, group: GroupId, r: &ChannelRef) -> Option<ChannelId> {
    if let Some(id) = r.id {
        if tree.channel_group(id) == Some(group) {
            return Some(id);
        }
    }
    if let Some(uid) = &r.unique_id {
        if let Some((id, _)) = channel_unique_ids(tree, group)
            .into_iter()
            .find(|(_, u)| u == uid)
        {
            return Some(id);
        }
    }
    if r.name.is_empty() && r.url.is_empty() {
        return None;
    }
    tree.channels_in(group).iter().copied().find(|id| {
        tree.channel(*id)
            .map(|ch| ch.same_identity(&r.name, &r.url))
            .unwrap_or(false)
    })
}
