//! Playlist tree: nested groups holding ordered channels.
//!
//! Groups and channels live in index tables; a group records its parent, its
//! ordered child groups and its ordered channels. Slots of removed nodes are
//! left empty so ids handed out earlier never point at a different node.

use crate::error::{Error, Result};
use crate::models::{Channel, Direction};
use crate::resolver::{self, NodeRef, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(usize);

#[derive(Debug, Clone)]
struct GroupNode {
    name: String,
    parent: Option<GroupId>,
    groups: Vec<GroupId>,
    channels: Vec<ChannelId>,
}

#[derive(Debug, Clone)]
struct ChannelSlot {
    group: GroupId,
    data: Channel,
}

/// Owned copy of a group subtree, detached from any arena
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSnapshot {
    pub channels: Vec<Channel>,
    pub groups: Vec<(String, GroupSnapshot)>,
}

impl GroupSnapshot {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
            + self
                .groups
                .iter()
                .map(|(_, g)| g.channel_count())
                .sum::<usize>()
    }
}

/// What ended up where after a copy/move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    Channel(ChannelId),
    Group { id: GroupId, key: String },
}

#[derive(Debug, Clone)]
pub struct PlaylistTree {
    groups: Vec<Option<GroupNode>>,
    channels: Vec<Option<ChannelSlot>>,
}

impl Default for PlaylistTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistTree {
    pub fn new() -> Self {
        Self {
            groups: vec![Some(GroupNode {
                name: String::new(),
                parent: None,
                groups: Vec::new(),
                channels: Vec::new(),
            })],
            channels: Vec::new(),
        }
    }

    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    fn node(&self, id: GroupId) -> Option<&GroupNode> {
        self.groups.get(id.0).and_then(|g| g.as_ref())
    }

    fn node_mut(&mut self, id: GroupId) -> Option<&mut GroupNode> {
        self.groups.get_mut(id.0).and_then(|g| g.as_mut())
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    /// Walk from the root along `path`
    pub fn group_at<S: AsRef<str>>(&self, path: &[S]) -> Option<GroupId> {
        let mut current = self.root();
        for key in path {
            current = self.find_child(current, key.as_ref())?;
        }
        Some(current)
    }

    fn group_at_or_err<S: AsRef<str>>(&self, path: &[S]) -> Result<GroupId> {
        self.group_at(path).ok_or_else(|| {
            let joined: Vec<&str> = path.iter().map(|s| s.as_ref()).collect();
            Error::NotFound(format!("group '{}'", joined.join("/")))
        })
    }

    pub fn find_child(&self, parent: GroupId, name: &str) -> Option<GroupId> {
        self.node(parent)?
            .groups
            .iter()
            .copied()
            .find(|g| self.group_name(*g) == Some(name))
    }

    /// Create every missing group along `path`
    pub fn ensure_path<S: AsRef<str>>(&mut self, path: &[S]) -> GroupId {
        let mut current = self.root();
        for key in path {
            current = match self.find_child(current, key.as_ref()) {
                Some(child) => child,
                None => self.push_group(current, key.as_ref()),
            };
        }
        current
    }

    pub fn group_name(&self, id: GroupId) -> Option<&str> {
        self.node(id).map(|g| g.name.as_str())
    }

    pub fn parent_of(&self, id: GroupId) -> Option<GroupId> {
        self.node(id)?.parent
    }

    /// Keys from the root down to `id`; empty for the root
    pub fn path_of(&self, id: GroupId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(gid) = current {
            match self.node(gid) {
                Some(node) if node.parent.is_some() => {
                    path.push(node.name.clone());
                    current = node.parent;
                }
                _ => break,
            }
        }
        path.reverse();
        path
    }

    pub fn group_title_of(&self, id: GroupId) -> String {
        self.path_of(id).join("/")
    }

    pub fn child_groups(&self, id: GroupId) -> &[GroupId] {
        self.node(id).map(|g| g.groups.as_slice()).unwrap_or(&[])
    }

    pub fn child_names(&self, id: GroupId) -> Vec<String> {
        self.child_groups(id)
            .iter()
            .filter_map(|g| self.group_name(*g).map(str::to_string))
            .collect()
    }

    pub fn channels_in(&self, id: GroupId) -> &[ChannelId] {
        self.node(id).map(|g| g.channels.as_slice()).unwrap_or(&[])
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0)?.as_ref().map(|slot| &slot.data)
    }

    pub fn channel_group(&self, id: ChannelId) -> Option<GroupId> {
        self.channels.get(id.0)?.as_ref().map(|slot| slot.group)
    }

    /// Every channel below `id`, pre-order (own channels first)
    pub fn channels_under(&self, id: GroupId) -> Vec<ChannelId> {
        let mut out = self.channels_in(id).to_vec();
        for child in self.child_groups(id) {
            out.extend(self.channels_under(*child));
        }
        out
    }

    pub fn channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_some()).count()
    }

    /// Number of groups, not counting the root
    pub fn group_count(&self) -> usize {
        self.groups.iter().filter(|g| g.is_some()).count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.channel_count() == 0 && self.group_count() == 0
    }

    /// Every group path in pre-order, starting with the root (empty path)
    pub fn all_group_paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_paths(self.root(), &mut Vec::new(), &mut out);
        out
    }

    fn collect_paths(&self, id: GroupId, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        out.push(prefix.clone());
        for child in self.child_groups(id) {
            if let Some(name) = self.group_name(*child) {
                prefix.push(name.to_string());
                self.collect_paths(*child, prefix, out);
                prefix.pop();
            }
        }
    }

    /// Whether `id` is `ancestor` or lies below it
    pub fn is_within(&self, id: GroupId, ancestor: GroupId) -> bool {
        let mut current = Some(id);
        while let Some(gid) = current {
            if gid == ancestor {
                return true;
            }
            current = self.parent_of(gid);
        }
        false
    }

    // ---------------------------------------------------------------
    // Low-level arena edits
    // ---------------------------------------------------------------

    fn push_group(&mut self, parent: GroupId, name: &str) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(Some(GroupNode {
            name: name.to_string(),
            parent: Some(parent),
            groups: Vec::new(),
            channels: Vec::new(),
        }));
        if let Some(node) = self.node_mut(parent) {
            node.groups.push(id);
        }
        id
    }

    /// Append a channel to `group`, deriving its group-title
    pub(crate) fn push_channel(&mut self, group: GroupId, mut channel: Channel) -> ChannelId {
        channel.group_title = self.group_title_of(group);
        let id = ChannelId(self.channels.len());
        self.channels.push(Some(ChannelSlot { group, data: channel }));
        if let Some(node) = self.node_mut(group) {
            node.channels.push(id);
        }
        id
    }

    fn detach_channel(&mut self, id: ChannelId) -> Option<Channel> {
        let slot = self.channels.get_mut(id.0)?.take()?;
        if let Some(node) = self.node_mut(slot.group) {
            node.channels.retain(|c| *c != id);
        }
        Some(slot.data)
    }

    fn detach_group(&mut self, id: GroupId) {
        if let Some(parent) = self.parent_of(id) {
            if let Some(node) = self.node_mut(parent) {
                node.groups.retain(|g| *g != id);
            }
        }
        self.drop_subtree(id);
    }

    fn drop_subtree(&mut self, id: GroupId) {
        let Some(node) = self.groups.get_mut(id.0).and_then(|g| g.take()) else {
            return;
        };
        for ch in node.channels {
            if let Some(slot) = self.channels.get_mut(ch.0) {
                *slot = None;
            }
        }
        for child in node.groups {
            self.drop_subtree(child);
        }
    }

    /// Edit a channel in place. group-title is re-derived afterwards.
    pub fn update_channel<F: FnOnce(&mut Channel)>(&mut self, id: ChannelId, edit: F) -> bool {
        let Some(group) = self.channel_group(id) else {
            return false;
        };
        let title = self.group_title_of(group);
        match self.channels.get_mut(id.0).and_then(|c| c.as_mut()) {
            Some(slot) => {
                edit(&mut slot.data);
                slot.data.group_title = title;
                true
            }
            None => false,
        }
    }

    /// Replace a channel's fields, keeping its position
    pub fn edit_channel(&mut self, id: ChannelId, updated: Channel) -> Result<()> {
        if updated.name.trim().is_empty() || updated.url.trim().is_empty() {
            return Err(Error::Validation(
                "Channel name and URL are required".to_string(),
            ));
        }
        if self.update_channel(id, |ch| *ch = updated) {
            Ok(())
        } else {
            Err(Error::NotFound("channel".to_string()))
        }
    }

    /// Re-derive group-title for every channel under `id`
    pub fn recompute_group_titles(&mut self, id: GroupId) {
        let title = self.group_title_of(id);
        let channels = self.channels_in(id).to_vec();
        for ch in channels {
            if let Some(slot) = self.channels.get_mut(ch.0).and_then(|c| c.as_mut()) {
                slot.data.group_title = title.clone();
            }
        }
        let children = self.child_groups(id).to_vec();
        for child in children {
            self.recompute_group_titles(child);
        }
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    pub fn snapshot(&self, id: GroupId) -> GroupSnapshot {
        GroupSnapshot {
            channels: self
                .channels_in(id)
                .iter()
                .filter_map(|c| self.channel(*c).cloned())
                .collect(),
            groups: self
                .child_groups(id)
                .iter()
                .filter_map(|g| Some((self.group_name(*g)?.to_string(), self.snapshot(*g))))
                .collect(),
        }
    }

    /// Insert `snapshot` as a new child `name` of `parent`. The caller picks
    /// a name that is free; group-title is derived for the whole subtree.
    pub fn graft(&mut self, parent: GroupId, name: &str, snapshot: &GroupSnapshot) -> GroupId {
        let id = self.push_group(parent, name);
        self.fill(id, snapshot);
        id
    }

    /// Append the contents of `snapshot` to an existing group. Child groups
    /// with a name already present are merged into the existing group.
    pub fn fill(&mut self, id: GroupId, snapshot: &GroupSnapshot) {
        for ch in &snapshot.channels {
            self.push_channel(id, ch.clone());
        }
        for (name, child) in &snapshot.groups {
            let child_id = match self.find_child(id, name) {
                Some(existing) => existing,
                None => self.push_group(id, name),
            };
            self.fill(child_id, child);
        }
    }

    pub fn from_snapshot(snapshot: &GroupSnapshot) -> Self {
        let mut tree = Self::new();
        let root = tree.root();
        tree.fill(root, snapshot);
        tree
    }

    // ---------------------------------------------------------------
    // Editing operations
    // ---------------------------------------------------------------

    /// Append `channel` to the group at `path`
    pub fn add_channel<S: AsRef<str>>(&mut self, path: &[S], channel: Channel) -> Result<ChannelId> {
        if channel.name.trim().is_empty() || channel.url.trim().is_empty() {
            return Err(Error::Validation(
                "Channel name and URL are required".to_string(),
            ));
        }
        let group = self.group_at_or_err(path)?;
        Ok(self.push_channel(group, channel))
    }

    /// Add an empty group. Returns `false` when the name is already taken
    /// at that level; the existing group is left as is.
    pub fn add_group<S: AsRef<str>>(&mut self, path: &[S], name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Group name cannot be empty".to_string()));
        }
        let parent = self.group_at_or_err(path)?;
        if self.find_child(parent, name).is_some() {
            return Ok(false);
        }
        self.push_group(parent, name);
        Ok(true)
    }

    /// Remove one channel from the group at `path`
    pub fn remove_channel<S: AsRef<str>>(&mut self, path: &[S], target: &NodeRef) -> bool {
        let Some(group) = self.group_at(path) else {
            return false;
        };
        match resolver::resolve_in(self, group, target) {
            Some(Resolved::Channel(id)) => self.detach_channel(id).is_some(),
            _ => false,
        }
    }

    /// Remove a child group and everything below it
    pub fn remove_group<S: AsRef<str>>(&mut self, path: &[S], key: &str) -> bool {
        let Some(parent) = self.group_at(path) else {
            return false;
        };
        match self.find_child(parent, key) {
            Some(id) => {
                self.detach_group(id);
                true
            }
            None => false,
        }
    }

    /// Remove every channel matching `pred` anywhere in the tree
    pub fn remove_channel_everywhere<F: Fn(&Channel) -> bool>(&mut self, pred: F) -> usize {
        let ids: Vec<ChannelId> = self
            .channels_under(self.root())
            .into_iter()
            .filter(|c| self.channel(*c).map(&pred).unwrap_or(false))
            .collect();
        for id in &ids {
            self.detach_channel(*id);
        }
        ids.len()
    }

    /// Remove the first group named `key` found depth-first
    pub fn remove_group_everywhere(&mut self, key: &str) -> bool {
        match self.find_first(self.root(), key) {
            Some(id) => {
                self.detach_group(id);
                true
            }
            None => false,
        }
    }

    fn find_first(&self, from: GroupId, key: &str) -> Option<GroupId> {
        if let Some(hit) = self.find_child(from, key) {
            return Some(hit);
        }
        self.child_groups(from)
            .iter()
            .find_map(|child| self.find_first(*child, key))
    }

    /// Rename a child group of the group at `path`. Position is kept and
    /// group-title is recomputed below the renamed group.
    pub fn rename_group<S: AsRef<str>>(&mut self, path: &[S], old: &str, new: &str) -> Result<bool> {
        let new = new.trim();
        if new.is_empty() || new == old {
            return Ok(false);
        }
        let parent = self.group_at_or_err(path)?;
        let id = self
            .find_child(parent, old)
            .ok_or_else(|| Error::NotFound(format!("group '{}'", old)))?;
        if self.find_child(parent, new).is_some() {
            return Err(Error::Validation(format!(
                "A group named '{}' already exists",
                new
            )));
        }
        if let Some(node) = self.node_mut(id) {
            node.name = new.to_string();
        }
        self.recompute_group_titles(id);
        Ok(true)
    }

    /// Shift the selected channels and groups of one level up or down by one
    /// position as a block. Channels and groups move independently; a block
    /// touching the boundary does not move at all.
    pub fn reorder_siblings<S: AsRef<str>>(
        &mut self,
        path: &[S],
        selected: &[NodeRef],
        direction: Direction,
    ) -> bool {
        let Some(group) = self.group_at(path) else {
            return false;
        };
        let mut channel_ids = Vec::new();
        let mut group_ids = Vec::new();
        for node in selected {
            match resolver::resolve_in(self, group, node) {
                Some(Resolved::Channel(id)) => channel_ids.push(id),
                Some(Resolved::Group(id)) => group_ids.push(id),
                None => {}
            }
        }
        let Some(node) = self.node_mut(group) else {
            return false;
        };
        let moved_channels = shift_block(&mut node.channels, &channel_ids, direction);
        let moved_groups = shift_block(&mut node.groups, &group_ids, direction);
        moved_channels || moved_groups
    }

    /// Deep-copy items from the group at `source` into `destination`
    pub fn copy_items<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        source: &[S],
        items: &[NodeRef],
        destination: &[D],
    ) -> Result<Vec<Inserted>> {
        self.transfer(source, items, destination, false)
    }

    /// Like [`copy_items`](Self::copy_items), then removes the originals
    pub fn move_items<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        source: &[S],
        items: &[NodeRef],
        destination: &[D],
    ) -> Result<Vec<Inserted>> {
        self.transfer(source, items, destination, true)
    }

    fn transfer<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        source: &[S],
        items: &[NodeRef],
        destination: &[D],
        remove_source: bool,
    ) -> Result<Vec<Inserted>> {
        let src = self.group_at_or_err(source)?;
        let dest = self.group_at_or_err(destination)?;

        // Resolve everything before the first mutation; unique ids depend on
        // positions that the inserts below change.
        let mut resolved = Vec::new();
        for item in items {
            if let Some(r) = resolver::resolve_in(self, src, item) {
                if !resolved.contains(&r) {
                    resolved.push(r);
                }
            }
        }

        if remove_source {
            for r in &resolved {
                if let Resolved::Group(gid) = r {
                    if self.is_within(dest, *gid) {
                        return Err(Error::Validation(
                            "Cannot move a group into itself".to_string(),
                        ));
                    }
                }
            }
        }

        let mut inserted = Vec::new();
        for r in resolved {
            match r {
                Resolved::Channel(cid) => {
                    let Some(data) = self.channel(cid).cloned() else {
                        continue;
                    };
                    if remove_source {
                        self.detach_channel(cid);
                    }
                    inserted.push(Inserted::Channel(self.push_channel(dest, data)));
                }
                Resolved::Group(gid) => {
                    let Some(name) = self.group_name(gid).map(str::to_string) else {
                        continue;
                    };
                    let snapshot = self.snapshot(gid);
                    if remove_source {
                        self.detach_group(gid);
                    }
                    let key = unique_copy_name(&self.child_names(dest), &name);
                    let id = self.graft(dest, &key, &snapshot);
                    inserted.push(Inserted::Group { id, key });
                }
            }
        }
        Ok(inserted)
    }

    /// Merge another tree into the group at `destination` without
    /// overwriting: root channels are appended, colliding top-level group
    /// names get a `_n` suffix.
    pub fn merge_import<S: AsRef<str>>(&mut self, imported: &PlaylistTree, destination: &[S]) -> Result<Vec<String>> {
        let dest = self.group_at_or_err(destination)?;
        let snapshot = imported.snapshot(imported.root());
        for ch in &snapshot.channels {
            self.push_channel(dest, ch.clone());
        }
        let mut keys = Vec::new();
        for (name, child) in &snapshot.groups {
            let key = unique_import_name(&self.child_names(dest), name);
            self.graft(dest, &key, child);
            keys.push(key);
        }
        Ok(keys)
    }
}

/// Free name for a copied/moved group: `name`, `name (1)`, `name (2)`, ...
pub fn unique_copy_name(existing: &[String], desired: &str) -> String {
    if !existing.iter().any(|e| e == desired) {
        return desired.to_string();
    }
    (1..)
        .map(|i| format!("{} ({})", desired, i))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| desired.to_string())
}

/// Free name for an imported group: `name`, `name_1`, `name_2`, ...
pub fn unique_import_name(existing: &[String], desired: &str) -> String {
    if !existing.iter().any(|e| e == desired) {
        return desired.to_string();
    }
    (1..)
        .map(|i| format!("{}_{}", desired, i))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| desired.to_string())
}

/// Move the entries of `seq` found in `selected` by one position as a block.
/// All-or-nothing: a block at the boundary leaves `seq` untouched.
fn shift_block<T: Copy + PartialEq>(seq: &mut [T], selected: &[T], direction: Direction) -> bool {
    let indices: Vec<usize> = seq
        .iter()
        .enumerate()
        .filter(|(_, item)| selected.contains(item))
        .map(|(i, _)| i)
        .collect();
    let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
        return false;
    };
    match direction {
        Direction::Up => {
            if first == 0 {
                return false;
            }
            for &i in &indices {
                seq.swap(i - 1, i);
            }
        }
        Direction::Down => {
            if last + 1 >= seq.len() {
                return false;
            }
            for &i in indices.iter().rev() {
                seq.swap(i, i + 1);
            }
        }
    }
    true
}
