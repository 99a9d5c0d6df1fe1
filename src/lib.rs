//! M3U playlist manager
//!
//! Nested-group playlist editing with M3U and JSON storage, and an action
//! menu extended by plugins.

pub mod config;
pub mod download;
pub mod editor;
pub mod epg;
pub mod error;
pub mod json_tree;
pub mod m3u_parser;
pub mod menu;
pub mod models;
pub mod playlist_file;
pub mod plugins;
pub mod resolver;
pub mod tasks;
pub mod theme;
pub mod tree;

pub use editor::EditorSession;
pub use error::{Error, Result};
pub use models::Channel;
pub use tree::PlaylistTree;
