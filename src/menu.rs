//! Nested action menus
//!
//! Plugin actions are grouped by the `/` segments of the plugin name and of
//! each action label. Plugins sharing a prefix share the submenu.

use std::collections::HashMap;

use crate::editor::EditorSession;
use crate::error::{Error, Result};
use crate::models::ItemFilter;
use crate::plugins::PluginRegistry;

/// Leaf of the plugin menu, dispatched through [`PluginRegistry::invoke`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle {
    pub unit: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuEntry<A> {
    Action(A),
    Submenu(Menu<A>),
}

/// Ordered label -> entry mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Menu<A> {
    entries: Vec<(String, MenuEntry<A>)>,
}

impl<A> Default for Menu<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<A> Menu<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[(String, MenuEntry<A>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&MenuEntry<A>> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, e)| e)
    }

    /// Insert or replace, keeping the original position of a replaced label
    fn set(&mut self, label: &str, entry: MenuEntry<A>) -> usize {
        match self.entries.iter().position(|(l, _)| l == label) {
            Some(i) => {
                self.entries[i].1 = entry;
                i
            }
            None => {
                self.entries.push((label.to_string(), entry));
                self.entries.len() - 1
            }
        }
    }

    pub fn with_action(mut self, label: &str, action: A) -> Self {
        self.set(label, MenuEntry::Action(action));
        self
    }

    pub fn with_submenu(mut self, label: &str, submenu: Menu<A>) -> Self {
        self.set(label, MenuEntry::Submenu(submenu));
        self
    }

    /// `None` when an action has since replaced a submenu on the route
    fn at_route_mut(&mut self, route: &[usize]) -> Option<&mut Menu<A>> {
        let mut menu = self;
        for &i in route {
            menu = match menu.entries.get_mut(i) {
                Some((_, MenuEntry::Submenu(sub))) => sub,
                _ => return None,
            };
        }
        Some(menu)
    }

    /// Follow labels down to an entry
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&MenuEntry<A>> {
        let (last, parents) = path.split_last()?;
        let mut menu = self;
        for label in parents {
            match menu.get(label.as_ref())? {
                MenuEntry::Submenu(sub) => menu = sub,
                MenuEntry::Action(_) => return None,
            }
        }
        menu.get(last.as_ref())
    }

    /// Indented outline, submenus marked with `>`
    pub fn outline(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.outline_into(0, &mut lines);
        lines
    }

    fn outline_into(&self, depth: usize, lines: &mut Vec<String>) {
        for (label, entry) in &self.entries {
            let indent = "  ".repeat(depth);
            match entry {
                MenuEntry::Action(_) => lines.push(format!("{}{}", indent, label)),
                MenuEntry::Submenu(sub) => {
                    lines.push(format!("{}> {}", indent, label));
                    sub.outline_into(depth + 1, lines);
                }
            }
        }
    }
}

/// Builds a menu from `/` separated paths, reusing submenus by the path
/// walked so far
struct MenuBuilder<A> {
    root: Menu<A>,
    cache: HashMap<String, Vec<usize>>,
}

impl<A> MenuBuilder<A> {
    fn new() -> Self {
        Self {
            root: Menu::new(),
            cache: HashMap::new(),
        }
    }

    /// Route to the submenu for `parts` under the submenu at `base`
    fn ensure(&mut self, base: &str, parts: &[&str]) -> Vec<usize> {
        let mut path_so_far = base.to_string();
        let mut route = if base.is_empty() {
            Vec::new()
        } else {
            self.cache.get(base).cloned().unwrap_or_default()
        };
        for part in parts {
            path_so_far = if path_so_far.is_empty() {
                part.to_string()
            } else {
                format!("{}/{}", path_so_far, part)
            };
            if let Some(cached) = self.cache.get(&path_so_far) {
                if self.root.at_route_mut(cached).is_some() {
                    route = cached.clone();
                    continue;
                }
            }
            let Some(parent) = self.root.at_route_mut(&route) else {
                return route;
            };
            let index = parent.set(part, MenuEntry::Submenu(Menu::new()));
            route.push(index);
            self.cache.insert(path_so_far.clone(), route.clone());
        }
        route
    }

    fn add(&mut self, owner: &str, label: &str, action: A) {
        let owner_parts: Vec<&str> = owner.split('/').collect();
        self.ensure("", &owner_parts);
        let label_parts: Vec<&str> = label.split('/').collect();
        let Some((leaf, folders)) = label_parts.split_last() else {
            return;
        };
        let route = self.ensure(owner, folders);
        if let Some(menu) = self.root.at_route_mut(&route) {
            menu.set(leaf, MenuEntry::Action(action));
        }
    }
}

/// Menu of every action of the active units
pub fn build_menu(registry: &PluginRegistry) -> Menu<ActionHandle> {
    let mut builder = MenuBuilder::new();
    for (unit, name, actions) in registry.active_units() {
        let owner_parts: Vec<&str> = name.split('/').collect();
        builder.ensure("", &owner_parts);
        for action in actions {
            builder.add(
                &name,
                &action.label,
                ActionHandle {
                    unit: unit.clone(),
                    action: action.id,
                },
            );
        }
    }
    builder.root
}

/// Fixed commands of the editor's own menus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    Copy,
    Move,
    Select(ItemFilter),
    Unselect(ItemFilter),
}

impl EditorCommand {
    /// Run against the session. Copy and Move need a destination path.
    pub fn apply(self, session: &mut EditorSession, destination: Option<&[String]>) -> Result<()> {
        match self {
            EditorCommand::Copy | EditorCommand::Move => {
                let destination = destination
                    .ok_or_else(|| Error::Validation("Choose a destination group".to_string()))?;
                if self == EditorCommand::Copy {
                    session.copy_selected(destination)?;
                } else {
                    session.move_selected(destination)?;
                }
                Ok(())
            }
            EditorCommand::Select(filter) => {
                session.select_items(true, filter);
                Ok(())
            }
            EditorCommand::Unselect(filter) => {
                session.select_items(false, filter);
                Ok(())
            }
        }
    }
}

pub fn copy_move_menu() -> Menu<EditorCommand> {
    Menu::new()
        .with_action("Copy", EditorCommand::Copy)
        .with_action("Move", EditorCommand::Move)
}

pub fn select_menu() -> Menu<EditorCommand> {
    let filters = |make: fn(ItemFilter) -> EditorCommand| {
        Menu::new()
            .with_action("All Items", make(ItemFilter::All))
            .with_action("All Channels", make(ItemFilter::Channels))
            .with_action("All Groups", make(ItemFilter::Groups))
    };
    Menu::new()
        .with_submenu("Select", filters(EditorCommand::Select))
        .with_submenu("Unselect", filters(EditorCommand::Unselect))
}

/// The editor's fixed menus by title
pub fn editor_menus() -> Vec<(&'static str, Menu<EditorCommand>)> {
    vec![
        ("Copy/Move", copy_move_menu()),
        ("Select/Unselect items", select_menu()),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Back,
    Close,
    Submenu,
    Action,
}

/// One visible row of an open menu view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuRow {
    pub label: String,
    pub kind: RowKind,
}

pub const BACK_LABEL: &str = "< Back";
pub const CLOSE_LABEL: &str = "Close Menu";

/// What choosing a row did
#[derive(Debug, Clone, PartialEq)]
pub enum MenuEvent<A> {
    Opened(String),
    Back,
    Closed,
    Action(A),
    Ignored,
}

/// Stack of open menu views. The root view offers "Close Menu", nested
/// views offer "< Back".
pub struct MenuNavigator<A> {
    root: Menu<A>,
    /// Label path of every open view, innermost last
    open: Vec<Vec<String>>,
}

impl<A: Clone> MenuNavigator<A> {
    /// Opens the root view
    pub fn new(root: Menu<A>) -> Self {
        Self {
            root,
            open: vec![Vec::new()],
        }
    }

    pub fn is_open(&self) -> bool {
        !self.open.is_empty()
    }

    /// Number of open views
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn current_path(&self) -> Option<&[String]> {
        self.open.last().map(Vec::as_slice)
    }

    fn current(&self) -> Option<&Menu<A>> {
        let path = self.open.last()?;
        if path.is_empty() {
            return Some(&self.root);
        }
        match self.root.find(path)? {
            MenuEntry::Submenu(sub) => Some(sub),
            MenuEntry::Action(_) => None,
        }
    }

    pub fn rows(&self) -> Vec<MenuRow> {
        let Some(menu) = self.current() else {
            return Vec::new();
        };
        let mut rows = Vec::with_capacity(menu.entries.len() + 1);
        let at_root = self.open.last().map(|p| p.is_empty()).unwrap_or(true);
        rows.push(if at_root {
            MenuRow {
                label: CLOSE_LABEL.to_string(),
                kind: RowKind::Close,
            }
        } else {
            MenuRow {
                label: BACK_LABEL.to_string(),
                kind: RowKind::Back,
            }
        });
        for (label, entry) in &menu.entries {
            rows.push(MenuRow {
                label: label.clone(),
                kind: match entry {
                    MenuEntry::Action(_) => RowKind::Action,
                    MenuEntry::Submenu(_) => RowKind::Submenu,
                },
            });
        }
        rows
    }

    /// Choose a row of the innermost view by label
    pub fn choose(&mut self, label: &str) -> MenuEvent<A> {
        let Some(path) = self.open.last().cloned() else {
            return MenuEvent::Ignored;
        };
        if path.is_empty() && label == CLOSE_LABEL {
            self.close_all();
            return MenuEvent::Closed;
        }
        if !path.is_empty() && label == BACK_LABEL {
            self.back();
            return MenuEvent::Back;
        }
        let entry = match self.current().and_then(|m| m.get(label)) {
            Some(entry) => entry.clone(),
            None => return MenuEvent::Ignored,
        };
        match entry {
            MenuEntry::Submenu(_) => {
                let mut child = path;
                child.push(label.to_string());
                self.open.push(child);
                MenuEvent::Opened(label.to_string())
            }
            MenuEntry::Action(action) => {
                // Running an action dismisses only the view it was chosen from
                self.open.pop();
                MenuEvent::Action(action)
            }
        }
    }

    /// Replace the innermost view with its parent
    pub fn back(&mut self) -> bool {
        if self.open.last().map(|p| p.is_empty()).unwrap_or(true) {
            return false;
        }
        if let Some(mut parent) = self.open.pop() {
            parent.pop();
            // The parent view was already open underneath
            if self.open.last() != Some(&parent) {
                self.open.push(parent);
            }
        }
        true
    }

    /// Dismiss every open view
    pub fn close_all(&mut self) {
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_menu() -> Menu<&'static str> {
        let mut b = MenuBuilder::new();
        b.add("Tools/Alpha", "Run", "alpha-run");
        b.add("Tools/Beta", "Assign.../tvg-logo", "beta-logo");
        b.add("Tools/Beta", "Assign.../tvg-id", "beta-id");
        b.add("Other", "Go", "other-go");
        b.root
    }

    #[test]
    fn test_shared_prefix_merges() {
        let menu = plugin_menu();
        let top: Vec<&str> = menu.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(top, vec!["Tools", "Other"]);
        assert_eq!(
            menu.find(&["Tools", "Beta", "Assign...", "tvg-id"]),
            Some(&MenuEntry::Action("beta-id"))
        );
        assert_eq!(
            menu.outline(),
            vec![
                "> Tools",
                "  > Alpha",
                "    Run",
                "  > Beta",
                "    > Assign...",
                "      tvg-logo",
                "      tvg-id",
                "> Other",
                "  Go",
            ]
        );
    }

    #[test]
    fn test_navigator_back_and_close() {
        let mut nav = MenuNavigator::new(plugin_menu());
        assert_eq!(nav.rows()[0].kind, RowKind::Close);

        assert_eq!(nav.choose("Tools"), MenuEvent::Opened("Tools".to_string()));
        assert_eq!(nav.choose("Beta"), MenuEvent::Opened("Beta".to_string()));
        assert_eq!(nav.depth(), 3);
        let rows = nav.rows();
        assert_eq!(rows[0].label, BACK_LABEL);
        assert_eq!(rows[1].kind, RowKind::Submenu);

        assert_eq!(nav.choose(BACK_LABEL), MenuEvent::Back);
        assert_eq!(nav.current_path(), Some(&["Tools".to_string()][..]));

        assert_eq!(nav.choose("Missing"), MenuEvent::Ignored);
        nav.close_all();
        assert!(!nav.is_open());
        assert_eq!(nav.choose("Tools"), MenuEvent::Ignored);
    }

    #[test]
    fn test_action_dismisses_its_view() {
        let mut nav = MenuNavigator::new(plugin_menu());
        nav.choose("Other");
        assert_eq!(nav.choose("Go"), MenuEvent::Action("other-go"));
        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.choose(CLOSE_LABEL), MenuEvent::Closed);
        assert!(!nav.is_open());
    }

    #[test]
    fn test_select_menu_shape() {
        let menu = select_menu();
        assert_eq!(
            menu.find(&["Unselect", "All Groups"]),
            Some(&MenuEntry::Action(EditorCommand::Unselect(ItemFilter::Groups)))
        );
        let titles: Vec<&str> = editor_menus().iter().map(|(t, _)| *t).collect();
        assert_eq!(titles, vec!["Copy/Move", "Select/Unselect items"]);
    }
}
