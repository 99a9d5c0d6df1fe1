//! Editor session: the open playlist, the level being viewed and the
//! selection. This is the context plugin actions receive.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{self, SharedConfig};
use crate::error::{Error, Result};
use crate::models::{Channel, Direction, ItemFilter, ItemKind};
use crate::playlist_file;
use crate::resolver::{self, ChannelRef, NodeRef, Resolved};
use crate::tasks::{Apply, BackgroundTasks, TaskOutcome};
use crate::theme::Theme;
use crate::tree::{ChannelId, GroupId, Inserted, PlaylistTree};

pub const BACK_ID: &str = "back";

/// One row of the displayed list
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub kind: ItemKind,
    pub unique_id: String,
    pub display_name: String,
    /// `None` for the Back row
    pub node: Option<NodeRef>,
}

/// Message for the user, shown by whatever front end is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

pub struct EditorSession {
    tree: PlaylistTree,
    current_path: Vec<String>,
    items: Vec<ListItem>,
    selected: BTreeSet<String>,
    theme: Theme,
    file_path: Option<PathBuf>,
    generation: u64,
    tasks: BackgroundTasks,
    config: SharedConfig,
    notices: Vec<Notice>,
}

impl EditorSession {
    pub fn new(config: SharedConfig) -> Self {
        let theme = Theme::from_dark_mode(config::lock(&config).dark_mode());
        let mut session = Self {
            tree: PlaylistTree::new(),
            current_path: Vec::new(),
            items: Vec::new(),
            selected: BTreeSet::new(),
            theme,
            file_path: None,
            generation: 0,
            tasks: BackgroundTasks::new(),
            config,
            notices: Vec::new(),
        };
        session.populate_list();
        session
    }

    // --- Accessors ---

    pub fn tree(&self) -> &PlaylistTree {
        &self.tree
    }

    /// Direct tree access for plugins; call [`populate_list`](Self::populate_list) after edits
    pub fn tree_mut(&mut self) -> &mut PlaylistTree {
        &mut self.tree
    }

    pub fn current_path(&self) -> &[String] {
        &self.current_path
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn selected_ids(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn current_group(&self) -> GroupId {
        self.tree
            .group_at(&self.current_path)
            .unwrap_or_else(|| self.tree.root())
    }

    // --- Notices ---

    pub fn notify(&mut self, title: &str, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {}", title, message);
        self.notices.push(Notice {
            title: title.to_string(),
            message,
        });
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // --- Lifecycle ---

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn new_empty(&mut self) {
        self.tree = PlaylistTree::new();
        self.current_path.clear();
        self.selected.clear();
        self.file_path = None;
        self.bump_generation();
        self.populate_list();
    }

    /// Load a playlist, replacing the current one. On failure nothing changes.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let tree = playlist_file::load_file(path)?;
        self.tree = tree;
        self.current_path.clear();
        self.selected.clear();
        self.file_path = Some(path.to_path_buf());
        self.bump_generation();
        if let Err(e) = config::lock(&self.config).set_last_file(path) {
            warn!("Failed to remember last file: {}", e);
        }
        self.populate_list();
        Ok(())
    }

    pub fn close(&mut self) {
        self.new_empty();
    }

    pub fn toggle_theme(&mut self) -> Result<Theme> {
        self.theme = self.theme.toggled();
        config::lock(&self.config).set_dark_mode(self.theme.is_dark())?;
        Ok(self.theme)
    }

    // --- Display list ---

    /// Rebuild the displayed rows for the current level. Selection is kept
    /// for rows whose unique id survives the rebuild.
    pub fn populate_list(&mut self) {
        while !self.current_path.is_empty() && self.tree.group_at(&self.current_path).is_none() {
            self.current_path.pop();
        }
        let group = self.current_group();
        let mut items = Vec::new();

        if !self.current_path.is_empty() {
            items.push(ListItem {
                kind: ItemKind::Back,
                unique_id: BACK_ID.to_string(),
                display_name: "Back".to_string(),
                node: None,
            });
        }

        for key in self.tree.child_names(group) {
            items.push(ListItem {
                kind: ItemKind::Group,
                unique_id: resolver::group_unique_id(&self.current_path, &key),
                display_name: key.clone(),
                node: Some(NodeRef::Group(key)),
            });
        }

        for (id, uid) in resolver::channel_unique_ids(&self.tree, group) {
            let Some(ch) = self.tree.channel(id) else {
                continue;
            };
            let display_name = if ch.name.is_empty() {
                "Unknown".to_string()
            } else {
                ch.name.clone()
            };
            items.push(ListItem {
                kind: ItemKind::Channel,
                unique_id: uid.clone(),
                display_name,
                node: Some(NodeRef::Channel(ChannelRef {
                    id: Some(id),
                    unique_id: Some(uid),
                    name: ch.name.clone(),
                    url: ch.url.clone(),
                })),
            });
        }

        self.selected
            .retain(|uid| items.iter().any(|i| i.kind != ItemKind::Back && &i.unique_id == uid));
        self.items = items;
    }

    pub fn open_group(&mut self, key: &str) -> Result<()> {
        let group = self.current_group();
        if self.tree.find_child(group, key).is_none() {
            return Err(Error::NotFound(format!("group '{}'", key)));
        }
        self.current_path.push(key.to_string());
        self.selected.clear();
        self.bump_generation();
        self.populate_list();
        Ok(())
    }

    /// Up one level; `false` at the root
    pub fn go_back(&mut self) -> bool {
        if self.current_path.pop().is_none() {
            return false;
        }
        self.selected.clear();
        self.bump_generation();
        self.populate_list();
        true
    }

    // --- Selection ---

    /// Flip selection of a row. Back and unknown ids are ignored.
    pub fn toggle_selected(&mut self, unique_id: &str) -> bool {
        let selectable = self
            .items
            .iter()
            .any(|i| i.kind != ItemKind::Back && i.unique_id == unique_id);
        if !selectable {
            return false;
        }
        if !self.selected.remove(unique_id) {
            self.selected.insert(unique_id.to_string());
        }
        true
    }

    pub fn select_items(&mut self, select: bool, filter: ItemFilter) {
        for item in &self.items {
            if !filter.matches(item.kind) {
                continue;
            }
            if select {
                self.selected.insert(item.unique_id.clone());
            } else {
                self.selected.remove(&item.unique_id);
            }
        }
    }

    /// References for the selected rows, in display order
    pub fn selected_refs(&self) -> Vec<NodeRef> {
        self.items
            .iter()
            .filter(|i| self.selected.contains(&i.unique_id))
            .filter_map(|i| i.node.clone())
            .collect()
    }

    /// Selected channels plus the direct channels of selected groups
    pub fn selected_channel_ids(&self) -> Vec<ChannelId> {
        let group = self.current_group();
        let mut out: Vec<ChannelId> = Vec::new();
        for node in self.selected_refs() {
            let found = match resolver::resolve_in(&self.tree, group, &node) {
                Some(Resolved::Channel(id)) => vec![id],
                Some(Resolved::Group(gid)) => self.tree.channels_in(gid).to_vec(),
                None => Vec::new(),
            };
            for id in found {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    fn require_selection(&self) -> Result<Vec<NodeRef>> {
        let refs = self.selected_refs();
        if refs.is_empty() {
            return Err(Error::Validation("No items selected.".to_string()));
        }
        Ok(refs)
    }

    // --- Editing ---

    pub fn add_channel(&mut self, channel: Channel) -> Result<ChannelId> {
        let id = self.tree.add_channel(&self.current_path, channel)?;
        self.populate_list();
        Ok(id)
    }

    pub fn add_group(&mut self, name: &str) -> Result<bool> {
        let added = self.tree.add_group(&self.current_path, name)?;
        self.populate_list();
        Ok(added)
    }

    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<bool> {
        let renamed = self.tree.rename_group(&self.current_path, old, new)?;
        if renamed {
            let old_uid = resolver::group_unique_id(&self.current_path, old);
            if self.selected.remove(&old_uid) {
                self.selected
                    .insert(resolver::group_unique_id(&self.current_path, new.trim()));
            }
            self.populate_list();
        }
        Ok(renamed)
    }

    /// Replace the fields of the channel shown under `unique_id`
    pub fn edit_channel(&mut self, unique_id: &str, updated: Channel) -> Result<()> {
        let target = NodeRef::UniqueId(unique_id.to_string());
        match resolver::resolve(&self.tree, &self.current_path, &target) {
            Some(Resolved::Channel(id)) => {
                self.tree.edit_channel(id, updated)?;
                self.populate_list();
                Ok(())
            }
            _ => Err(Error::NotFound(format!("channel '{}'", unique_id))),
        }
    }

    pub fn delete_selected(&mut self) -> Result<usize> {
        let refs = self.require_selection()?;
        let mut removed = 0;
        for node in &refs {
            let done = match node {
                NodeRef::Group(key) => self.tree.remove_group(&self.current_path, key),
                other => self.tree.remove_channel(&self.current_path, other),
            };
            if done {
                removed += 1;
            }
        }
        self.selected.clear();
        self.populate_list();
        Ok(removed)
    }

    /// Move the selected rows one step as a block; `false` at a boundary
    pub fn reorder_selected(&mut self, direction: Direction) -> Result<bool> {
        let refs = self.require_selection()?;
        let moved = self
            .tree
            .reorder_siblings(&self.current_path, &refs, direction);
        self.populate_list();
        Ok(moved)
    }

    pub fn copy_selected(&mut self, destination: &[String]) -> Result<Vec<Inserted>> {
        let refs = self.require_selection()?;
        let inserted = self
            .tree
            .copy_items(&self.current_path, &refs, destination)?;
        self.populate_list();
        Ok(inserted)
    }

    pub fn move_selected(&mut self, destination: &[String]) -> Result<Vec<Inserted>> {
        let refs = self.require_selection()?;
        let source = self.current_path.clone();
        let inserted = self.tree.move_items(&source, &refs, destination)?;
        self.selected.clear();
        self.populate_list();
        Ok(inserted)
    }

    /// Merge another playlist file into the current level
    pub fn import_file(&mut self, path: &Path) -> Result<Vec<String>> {
        let imported = playlist_file::import_file(path)?;
        let keys = self.tree.merge_import(&imported, &self.current_path)?;
        info!(
            "Imported {} channels from {}",
            imported.channel_count(),
            path.display()
        );
        self.populate_list();
        Ok(keys)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<PathBuf> {
        let written = playlist_file::save_file(path, &self.tree)?;
        if let Err(e) = config::lock(&self.config).set_last_file(&written) {
            warn!("Failed to remember last file: {}", e);
        }
        self.file_path = Some(written.clone());
        Ok(written)
    }

    pub fn save(&mut self) -> Result<PathBuf> {
        let path = self
            .file_path
            .clone()
            .ok_or_else(|| Error::Validation("No file name set".to_string()))?;
        self.save_as(&path)
    }

    // --- Background work ---

    /// Run `work` off-thread. The result is dropped if the user navigated
    /// or reopened before it arrived.
    pub fn spawn_background<F>(&self, label: &str, work: F)
    where
        F: FnOnce() -> Result<Apply> + Send + 'static,
    {
        self.tasks.spawn(label, Some(self.generation), work);
    }

    /// Like [`spawn_background`](Self::spawn_background) but always applied
    pub fn spawn_detached<F>(&self, label: &str, work: F)
    where
        F: FnOnce() -> Result<Apply> + Send + 'static,
    {
        self.tasks.spawn(label, None, work);
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.in_flight()
    }

    /// Apply finished background results. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let outcomes = self.tasks.drain();
        self.apply_outcomes(outcomes)
    }

    /// Pump until no task is running or `timeout` passes
    pub fn pump_until_idle(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        loop {
            let outcomes = self.tasks.wait(Duration::from_millis(50));
            let idle = outcomes.is_empty() && self.tasks.in_flight() == 0;
            applied += self.apply_outcomes(outcomes);
            if idle {
                applied += self.pump();
                break;
            }
            if Instant::now() >= deadline {
                warn!("Background work still running after {:?}", timeout);
                break;
            }
        }
        applied
    }

    fn apply_outcomes(&mut self, outcomes: Vec<TaskOutcome>) -> usize {
        let mut applied = 0;
        for outcome in outcomes {
            if let Some(generation) = outcome.generation {
                if generation != self.generation {
                    info!(
                        "Discarding stale result of '{}' (generation {} != {})",
                        outcome.label, generation, self.generation
                    );
                    continue;
                }
            }
            match outcome.result.and_then(|apply| apply(self)) {
                Ok(()) => {
                    debug!("Background task applied: {}", outcome.label);
                    applied += 1;
                }
                Err(e) => {
                    error!("{} failed: {}", outcome.label, e);
                    self.notices.push(Notice {
                        title: "Error".to_string(),
                        message: format!("{}: {}", outcome.label, e),
                    });
                }
            }
        }
        if applied > 0 {
            self.populate_list();
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn session() -> EditorSession {
        let mut s = EditorSession::new(config::shared(AppConfig::in_memory()));
        s.add_group("News").unwrap();
        s.add_group("Sports").unwrap();
        s.add_channel(Channel::new("A", "http://x/a")).unwrap();
        s.add_channel(Channel::new("B", "http://x/b")).unwrap();
        s
    }

    fn uid_of(s: &EditorSession, name: &str) -> String {
        s.items()
            .iter()
            .find(|i| i.display_name == name)
            .unwrap()
            .unique_id
            .clone()
    }

    #[test]
    fn test_list_layout_back_groups_channels() {
        let mut s = session();
        let kinds: Vec<ItemKind> = s.items().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![ItemKind::Group, ItemKind::Group, ItemKind::Channel, ItemKind::Channel]
        );
        s.open_group("News").unwrap();
        assert_eq!(s.items()[0].kind, ItemKind::Back);
        assert!(!s.toggle_selected(BACK_ID));
    }

    #[test]
    fn test_select_filters() {
        let mut s = session();
        s.select_items(true, ItemFilter::Channels);
        assert_eq!(s.selected_ids().len(), 2);
        s.select_items(true, ItemFilter::All);
        assert_eq!(s.selected_ids().len(), 4);
        s.select_items(false, ItemFilter::Groups);
        assert_eq!(s.selected_ids().len(), 2);
    }

    #[test]
    fn test_empty_selection_is_validation_error() {
        let mut s = session();
        assert!(matches!(s.delete_selected(), Err(Error::Validation(_))));
        assert!(matches!(
            s.reorder_selected(Direction::Up),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_delete_selected_mixed() {
        let mut s = session();
        let a = uid_of(&s, "A");
        let news = uid_of(&s, "News");
        s.toggle_selected(&a);
        s.toggle_selected(&news);
        assert_eq!(s.delete_selected().unwrap(), 2);
        assert_eq!(s.tree().channel_count(), 1);
        assert_eq!(s.tree().child_names(s.tree().root()), vec!["Sports"]);
        assert!(s.selected_ids().is_empty());
    }

    #[test]
    fn test_reorder_keeps_selection() {
        let mut s = session();
        let b = uid_of(&s, "B");
        s.toggle_selected(&b);
        assert!(s.reorder_selected(Direction::Up).unwrap());
        let names: Vec<&str> = s.items().iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["News", "Sports", "B", "A"]);
        assert!(s.selected_ids().contains(&b));
        assert!(!s.reorder_selected(Direction::Up).unwrap());
    }

    #[test]
    fn test_move_selected_into_group() {
        let mut s = session();
        let a = uid_of(&s, "A");
        s.toggle_selected(&a);
        s.move_selected(&["Sports".to_string()]).unwrap();
        s.open_group("Sports").unwrap();
        let moved = s.items().iter().find(|i| i.display_name == "A").unwrap();
        assert_eq!(moved.kind, ItemKind::Channel);
        let sports = s.current_group();
        let id = s.tree().channels_in(sports)[0];
        assert_eq!(s.tree().channel(id).unwrap().group_title, "Sports");
    }

    #[test]
    fn test_rename_group_keeps_selection() {
        let mut s = session();
        let news = uid_of(&s, "News");
        s.toggle_selected(&news);
        assert!(s.rename_group("News", "Info").unwrap());
        assert!(s.selected_ids().contains(&uid_of(&s, "Info")));
    }

    #[test]
    fn test_edit_channel_by_unique_id() {
        let mut s = session();
        let a = uid_of(&s, "A");
        s.edit_channel(&a, Channel::new("A2", "http://x/a2")).unwrap();
        assert!(s.items().iter().any(|i| i.display_name == "A2"));
        assert!(s.edit_channel("nope", Channel::new("x", "y")).is_err());
    }

    #[test]
    fn test_stale_background_result_is_discarded() {
        let mut s = session();
        s.spawn_background("rename", || {
            Ok(Box::new(|s: &mut EditorSession| {
                s.add_group("FromWorker").map(|_| ())
            }) as Apply)
        });
        s.open_group("News").unwrap();
        s.pump_until_idle(Duration::from_secs(5));
        assert!(s.tree().group_at(&["FromWorker"]).is_none());
        assert!(s.tree().group_at(&["News", "FromWorker"]).is_none());
    }

    #[test]
    fn test_background_result_applied_on_pump() {
        let mut s = session();
        s.spawn_background("add", || {
            Ok(Box::new(|s: &mut EditorSession| s.add_group("FromWorker").map(|_| ())) as Apply)
        });
        assert_eq!(s.pump_until_idle(Duration::from_secs(5)), 1);
        assert!(s.items().iter().any(|i| i.display_name == "FromWorker"));
    }

    #[test]
    fn test_background_error_becomes_notice() {
        let mut s = session();
        s.spawn_detached("download", || Err(Error::Network("offline".to_string())));
        s.pump_until_idle(Duration::from_secs(5));
        let notices = s.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("offline"));
    }

    #[test]
    fn test_open_missing_file_leaves_session_untouched() {
        let mut s = session();
        let before = s.tree().channel_count();
        assert!(s.open(Path::new("/nonexistent/list.m3u")).is_err());
        assert_eq!(s.tree().channel_count(), before);
    }
}
