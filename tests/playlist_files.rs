use std::fs;

use m3u_manager::config::{self, AppConfig};
use m3u_manager::models::ItemFilter;
use m3u_manager::{playlist_file, EditorSession, Error};

const PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"cnn.us\" group-title=\"News\",CNN\n\
http://x/cnn\n\
#EXTINF:-1 group-title=\"News/Local\",Channel 5\n\
http://x/5\n\
#EXTINF:-1 group-title=\"Sports\",ESPN\n\
http://x/espn\n";

fn session(dir: &tempfile::TempDir) -> EditorSession {
    EditorSession::new(config::shared(AppConfig::load_from(&dir.path().join("config.json"))))
}

#[test]
fn edit_and_save_as_json_then_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("list.m3u");
    fs::write(&source, PLAYLIST).unwrap();

    let mut s = session(&dir);
    s.open(&source).unwrap();
    assert_eq!(s.tree().channel_count(), 3);

    assert!(s.rename_group("News", "World").unwrap());
    s.open_group("World").unwrap();
    s.open_group("Local").unwrap();
    s.select_items(true, ItemFilter::Channels);
    s.move_selected(&["Sports".to_string()]).unwrap();

    let saved = s.save_as(&dir.path().join("edited.json")).unwrap();
    let text = fs::read_to_string(&saved).unwrap();
    assert!(text.starts_with("{\n    \"_channels\": [],\n    \"World\": {"));

    let mut reopened = session(&dir);
    reopened.open(&saved).unwrap();
    let tree = reopened.tree();
    let sports = tree.group_at(&["Sports"]).unwrap();
    let titles: Vec<&str> = tree
        .channels_in(sports)
        .iter()
        .map(|&id| tree.channel(id).unwrap().group_title.as_str())
        .collect();
    assert_eq!(titles, vec!["Sports", "Sports"]);
    let world = tree.group_at(&["World"]).unwrap();
    let cnn = tree.channels_in(world)[0];
    assert_eq!(tree.channel(cnn).unwrap().tvg_id, "cnn.us");

    let config = config::lock(reopened.config()).last_file();
    assert_eq!(config, saved.to_string_lossy());
}

#[test]
fn save_without_extension_writes_m3u() {
    let dir = tempfile::tempdir().unwrap();
    let tree = playlist_file::parse_content(PLAYLIST).unwrap();
    let written = playlist_file::save_file(&dir.path().join("plain"), &tree).unwrap();
    assert_eq!(written.extension().unwrap(), "m3u");

    let back = playlist_file::load_file(&written).unwrap();
    assert_eq!(back.channel_count(), 3);
    assert!(back.group_at(&["News", "Local"]).is_some());
}

#[test]
fn import_merges_with_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.m3u");
    let extra = dir.path().join("extra.m3u8");
    fs::write(&target, PLAYLIST).unwrap();
    fs::write(
        &extra,
        "#EXTM3U\n#EXTINF:-1 group-title=\"Sports\",Eurosport\nhttp://x/euro\n",
    )
    .unwrap();

    let mut s = session(&dir);
    s.open(&target).unwrap();
    let keys = s.import_file(&extra).unwrap();
    assert_eq!(keys, vec!["Sports_1"]);

    let sports = s.tree().group_at(&["Sports_1"]).unwrap();
    let euro = s.tree().channels_in(sports)[0];
    assert_eq!(s.tree().channel(euro).unwrap().group_title, "Sports_1");
}

#[test]
fn import_rejects_unknown_extension_and_keeps_tree() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.m3u");
    let other = dir.path().join("other.txt");
    fs::write(&target, PLAYLIST).unwrap();
    fs::write(&other, PLAYLIST).unwrap();

    let mut s = session(&dir);
    s.open(&target).unwrap();
    assert!(matches!(s.import_file(&other), Err(Error::UnsupportedFormat(_))));
    assert_eq!(s.tree().channel_count(), 3);
}
