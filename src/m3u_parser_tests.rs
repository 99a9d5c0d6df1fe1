//! Tests for M3U parsing and writing against the playlist tree

#[cfg(test)]
mod tests {
    use crate::m3u_parser::*;
    use crate::models::Channel;
    use crate::tree::{GroupId, PlaylistTree};

    fn channels_at<'a>(tree: &'a PlaylistTree, path: &[&str]) -> Vec<&'a Channel> {
        let group = tree.group_at(path).unwrap();
        tree.channels_in(group)
            .iter()
            .map(|id| tree.channel(*id).unwrap())
            .collect()
    }

    /// (group path, channel) for every channel, in traversal order
    fn flatten(tree: &PlaylistTree) -> Vec<(String, Channel)> {
        fn walk(tree: &PlaylistTree, g: GroupId, out: &mut Vec<(String, Channel)>) {
            for id in tree.channels_in(g) {
                out.push((tree.group_title_of(g), tree.channel(*id).unwrap().clone()));
            }
            for child in tree.child_groups(g) {
                walk(tree, *child, out);
            }
        }
        let mut out = Vec::new();
        walk(tree, tree.root(), &mut out);
        out
    }

    #[test]
    fn test_parse_single_group_scenario() {
        let tree = parse_m3u("#EXTM3U\n#EXTINF:-1 group-title=\"News\",News1\nhttp://x/1\n");
        assert_eq!(tree.child_names(tree.root()), vec!["News"]);
        let news = channels_at(&tree, &["News"]);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].name, "News1");
        assert_eq!(news[0].group_title, "News");
        assert_eq!(news[0].url, "http://x/1");
        assert!(channels_at(&tree, &[]).is_empty());
    }

    #[test]
    fn test_parse_nested_group_title() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="bbc.uk" group-title="Europe/UK",BBC One
http://x/bbc
#EXTINF:-1,No Group
http://x/none
"#;
        let tree = parse_m3u(content);
        let uk = channels_at(&tree, &["Europe", "UK"]);
        assert_eq!(uk[0].tvg_id, "bbc.uk");
        assert_eq!(uk[0].group_title, "Europe/UK");
        let root = channels_at(&tree, &[]);
        assert_eq!(root[0].name, "No Group");
        assert_eq!(root[0].group_title, "");
    }

    #[test]
    fn test_name_falls_back_to_tvg_id_then_unknown() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="cnn.us"
http://x/1
#EXTINF:-1 radio="true"
http://x/2
"#;
        let tree = parse_m3u(content);
        let root = channels_at(&tree, &[]);
        assert_eq!(root[0].name, "cnn.us");
        assert_eq!(root[1].name, "Unknown");
    }

    #[test]
    fn test_orphan_url_dropped() {
        let content = "#EXTM3U\nhttp://x/orphan\n#EXTINF:-1,Kept\nhttp://x/kept\nhttp://x/second\n";
        let tree = parse_m3u(content);
        assert_eq!(tree.channel_count(), 1);
        assert_eq!(channels_at(&tree, &[])[0].url, "http://x/kept");
    }

    #[test]
    fn test_comment_lines_between_extinf_and_url() {
        let content = "#EXTM3U\n#EXTINF:-1,Radio\n#EXTVLCOPT:network-caching=1000\n\nhttp://x/r\n";
        let tree = parse_m3u(content);
        assert_eq!(channels_at(&tree, &[])[0].url, "http://x/r");
    }

    #[test]
    fn test_extgrp_used_when_no_group_title() {
        let content = "#EXTM3U\n#EXTINF:-1,Music\n#EXTGRP:Radio\nhttp://x/m\n";
        let tree = parse_m3u(content);
        assert_eq!(channels_at(&tree, &["Radio"])[0].group_title, "Radio");
    }

    #[test]
    fn test_parse_m3u_with_epg_url() {
        let content = r#"#EXTM3U x-tvg-url="http://example.com/epg.xml"
#EXTINF:-1 tvg-id="ch1" tvg-name="Channel One" group-title="General" catchup="default" catchup-days="7",Channel 1
http://example.com/live/user/pass/1.ts
"#;
        let playlist = parse_m3u_playlist(content);
        assert_eq!(playlist.epg_url, Some("http://example.com/epg.xml".to_string()));
        let general = channels_at(&playlist.tree, &["General"]);
        assert_eq!(general[0].tvg_name, "Channel One");
        assert_eq!(general[0].catchup, "default");
        assert_eq!(general[0].catchup_days, "7");
    }

    #[test]
    fn test_unknown_attributes_preserved() {
        let content = "#EXTM3U\n#EXTINF:-1 tvg-chno=\"12\" x-provider=\"acme\",A\nhttp://x/a\n";
        let tree = parse_m3u(content);
        let a = channels_at(&tree, &[])[0];
        assert_eq!(a.tvg_chno, "12");
        assert_eq!(a.extra.get("x-provider").map(String::as_str), Some("acme"));
        let out = serialize_m3u(&tree);
        assert!(out.contains(r#"#EXTINF:-1 tvg-chno="12" x-provider="acme",A"#));
    }

    #[test]
    fn test_backslash_and_quote_values_round_trip() {
        let mut tree = PlaylistTree::new();
        tree.add_group::<&str>(&[], "News").unwrap();
        let ch = Channel::new("A", "http://x/a")
            .with_attr("tvg-logo", r"C:\logos\")
            .with_attr("tvg-name", r#"Say "hi" \o/"#);
        tree.add_channel(&["News"], ch).unwrap();

        let out = serialize_m3u(&tree);
        assert!(out.contains(r#"tvg-logo="C:\\logos\\""#));

        let reparsed = parse_m3u(&out);
        let news = channels_at(&reparsed, &["News"]);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].name, "A");
        assert_eq!(news[0].tvg_logo, r"C:\logos\");
        assert_eq!(news[0].tvg_name, r#"Say "hi" \o/"#);
        assert_eq!(news[0].group_title, "News");
        assert!(channels_at(&reparsed, &[]).is_empty());
    }

    #[test]
    fn test_lone_backslash_kept_literally() {
        let content = "#EXTM3U\n#EXTINF:-1 tvg-logo=\"C:\\logos\\a.png\",A\nhttp://x/a\n";
        let tree = parse_m3u(content);
        assert_eq!(channels_at(&tree, &[])[0].tvg_logo, "C:\\logos\\a.png");
    }

    #[test]
    fn test_serialize_omits_empty_and_orders_attrs() {
        let mut tree = PlaylistTree::new();
        tree.add_group::<&str>(&[], "News").unwrap();
        let ch = Channel::new("CNN", "http://x/cnn")
            .with_attr("group-title", "ignored")
            .with_attr("tvg-logo", "l.png")
            .with_attr("tvg-id", "cnn");
        tree.add_channel(&["News"], ch).unwrap();
        let out = serialize_m3u(&tree);
        assert_eq!(
            out,
            "#EXTM3U\n#EXTINF:-1 tvg-id=\"cnn\" tvg-logo=\"l.png\" group-title=\"News\",CNN\nhttp://x/cnn\n"
        );
    }

    #[test]
    fn test_serialize_writes_group_channels_before_children() {
        let mut tree = PlaylistTree::new();
        tree.add_group::<&str>(&[], "A").unwrap();
        tree.add_group(&["A"], "B").unwrap();
        tree.add_channel(&["A", "B"], Channel::new("inner", "u2")).unwrap();
        tree.add_channel(&["A"], Channel::new("outer", "u1")).unwrap();
        let out = serialize_m3u(&tree);
        let outer = out.find(",outer").unwrap();
        let inner = out.find(",inner").unwrap();
        assert!(outer < inner);
    }

    #[test]
    fn test_round_trip_preserves_channels_and_paths() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="a" tvg-name="Alpha \"A\"" tvg-logo="http://l/a.png" catchup="shift" catchup-days="3" group-title="Sports/Football",Alpha
http://x/a
#EXTINF:-1 radio="true" group-title="Radio",Beta, the station
http://x/b
#EXTINF:-1 tvg-shift="+1",Gamma
http://x/c
#EXTINF:-1 group-title="Sports",Delta
http://x/d
"#;
        let first = parse_m3u(content);
        let second = parse_m3u(&serialize_m3u(&first));

        let mut a = flatten(&first);
        let mut b = flatten(&second);
        a.sort_by(|x, y| (&x.0, &x.1.name).cmp(&(&y.0, &y.1.name)));
        b.sort_by(|x, y| (&x.0, &x.1.name).cmp(&(&y.0, &y.1.name)));
        assert_eq!(a, b);
        assert_eq!(second.channel_count(), 4);

        let football = channels_at(&second, &["Sports", "Football"]);
        assert_eq!(football[0].tvg_name, "Alpha \"A\"");
        assert_eq!(channels_at(&second, &["Radio"])[0].name, "the station");
    }
}
