use std::fs;
use std::io::Write;
use std::path::Path;

use m3u_manager::config::{self, AppConfig};
use m3u_manager::menu::{self, MenuEntry};
use m3u_manager::models::{Channel, ItemFilter};
use m3u_manager::plugins::{PluginContext, PluginRegistry};
use m3u_manager::EditorSession;

fn unit_json(name: &str, field: &str, value: &str) -> String {
    format!(
        r#"{{
    "name": "{}",
    "actions": [
        {{"label": "Tag/{}", "steps": [{{"op": "set", "field": "{}", "value": "{}"}}]}}
    ]
}}"#,
        name, field, field, value
    )
}

fn write_zip(path: &Path, files: &[(&str, String)]) {
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn load_registry(dir: &Path) -> PluginRegistry {
    let config = config::shared(AppConfig::load_from(&dir.join("config.json")));
    let ctx = PluginContext::new(config, dir.join("cache"));
    let mut registry = PluginRegistry::new(ctx, &dir.join("plugins"));
    registry.load();
    registry
}

#[test]
fn zip_install_reports_units_disabled_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("bundle.zip");
    write_zip(
        &archive,
        &[
            ("plugin_a.json", unit_json("Tools/Alpha", "tvg-id", "a")),
            ("plugin_b.json", unit_json("Tools/Beta", "tvg-name", "b")),
            ("__shared.json", "{}".to_string()),
        ],
    );

    let mut registry = load_registry(dir.path());
    let units = registry.install(&archive).unwrap();
    assert_eq!(units, vec!["plugin_a", "plugin_b"]);

    let listed: Vec<(String, bool)> = registry
        .units()
        .into_iter()
        .filter(|u| u.unit.starts_with("plugin_"))
        .map(|u| (u.unit, u.active))
        .collect();
    assert_eq!(
        listed,
        vec![("plugin_a".to_string(), false), ("plugin_b".to_string(), false)]
    );
    assert!(menu::build_menu(&registry).is_empty());
}

#[test]
fn install_and_enable_merges_menus_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("bundle.zip");
    write_zip(
        &archive,
        &[
            ("plugin_a.json", unit_json("Tools/Alpha", "tvg-id", "a")),
            ("plugin_b.json", unit_json("Tools/Beta", "tvg-name", "b")),
        ],
    );

    let mut registry = load_registry(dir.path());
    registry.install_and_enable(&archive).unwrap();

    let menu = menu::build_menu(&registry);
    assert_eq!(menu.entries().len(), 1);
    assert_eq!(
        menu.outline(),
        vec![
            "> Tools",
            "  > Alpha",
            "    > Tag",
            "      tvg-id",
            "  > Beta",
            "    > Tag",
            "      tvg-name",
        ]
    );

    // A fresh registry over the same config sees the enabled set
    let reloaded = load_registry(dir.path());
    let active: Vec<String> = reloaded.active_units().into_iter().map(|u| u.0).collect();
    assert_eq!(active, vec!["plugin_a", "plugin_b"]);
}

#[test]
fn menu_action_edits_selection() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("plugins")).unwrap();
    fs::write(
        dir.path().join("plugins/tagger.json"),
        unit_json("Tools/Alpha", "tvg-id", "tagged"),
    )
    .unwrap();

    let mut registry = load_registry(dir.path());
    registry.toggle("tagger", true).unwrap();

    let config = config::shared(AppConfig::in_memory());
    let mut session = EditorSession::new(config);
    session.add_group("News").unwrap();
    session
        .tree_mut()
        .add_channel(&["News"], Channel::new("CNN", "http://x/cnn"))
        .unwrap();
    session.populate_list();
    session.select_items(true, ItemFilter::Groups);

    let menu = menu::build_menu(&registry);
    let handle = match menu.find(&["Tools", "Alpha", "Tag", "tvg-id"]) {
        Some(MenuEntry::Action(handle)) => handle.clone(),
        other => panic!("unexpected menu entry {:?}", other),
    };
    registry.invoke(&handle, &mut session).unwrap();

    let tree = session.tree();
    let news = tree.group_at(&["News"]).unwrap();
    let cnn = tree.channels_in(news)[0];
    assert_eq!(tree.channel(cnn).unwrap().tvg_id, "tagged");
    assert_eq!(tree.channel(cnn).unwrap().group_title, "News");
}

#[test]
fn unsupported_archive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("bundle.7z");
    fs::write(&archive, b"7z").unwrap();
    let mut registry = load_registry(dir.path());
    assert!(matches!(
        registry.install(&archive),
        Err(m3u_manager::Error::UnsupportedFormat(_))
    ));
}
