use scribe::build::{build_site, clean, Error};
use scribe::config::{Config, CONFIG_FILE};
use scribe::post::Edit;
use scribe::site::{sha256_hex, PROJECT_HASH_FILE, RECENTS_HASH_FILE};
use std::fs;
use std::path::Path;

const BLOG: &str = r##"{
    "title": "notes",
    "blog": "https://notes.example.org",
    "top-words": 3,
    "editor": ["vim", "--", "%s"],
    "posts": {
        "second": {
            "title": "Second",
            "description": "the second post",
            "content": "# Intro\n\nRust rust *fun*.\n\n## Intro\n\nSee <#:Intro>.",
            "keywords": ["rust", "blog"],
            "created": 1684000000.0,
            "edited": 1684100000.0
        },
        "first": {
            "title": "First & Foremost",
            "description": "the first post",
            "content": "Fun with rust.",
            "keywords": ["rust"],
            "created": 1683000000.0
        }
    }
}"##;

fn project(dir: &Path, json: &str) -> Config {
    let path = dir.join(CONFIG_FILE);
    fs::write(&path, json).unwrap();
    Config::load(&path).unwrap()
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn builds_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), BLOG);
    let out = dir.path().join("site");

    let outcome = build_site(&config, &dir.path().join(CONFIG_FILE), &out).unwrap();
    assert_eq!(2, outcome.posts.len());
    assert_eq!(2, outcome.stats.posts);

    let second = read(out.join("b/second/index.html"));
    assert!(second.contains("<h2 id=\"intro\"><a href=\"#intro\">#</a> Intro</h2>"));
    assert!(second.contains("<h2 id=\"intro-1\"><a href=\"#intro-1\">#</a> Intro</h2>"));
    assert!(second.contains("<a href=\"#intro\"># Intro</a>"));
    assert!(second.contains("edited on <time>2023-05-14 21:33:20</time>"));

    let first = read(out.join("b/first/index.html"));
    assert!(first.contains("First &amp; Foremost"));

    let index = read(out.join("index.html"));
    assert!(index.contains("latest post : <a href=\"/b/second\">Second</a>"));
    assert!(index.find("/b/second") < index.find("/b/first"));

    // `intro` and `rust` tie at 3 and `intro` is seen first; the
    // cross-reference marker counts as a word.
    let stats = read(out.join("stats/index.html"));
    assert!(stats.contains("<li>posts : 2</li>"));
    assert!(stats.contains(
        "<ol id=\"top-words-list\"><li>intro : 3</li><li>rust : 3</li><li>fun : 2</li></ol>"
    ));
    assert!(stats.contains("<li>rust : 2</li>"));

    let feed = read(out.join("rss.xml"));
    assert!(feed.contains("<link>https://notes.example.org/b/first</link>"));
    let sitemap = read(out.join("sitemap.xml"));
    assert!(sitemap.contains("<loc>https://notes.example.org/b/second</loc>"));
    assert!(read(out.join("robots.txt")).ends_with("Sitemap: https://notes.example.org/sitemap.xml"));
    assert!(read(out.join("manifest.json")).contains("\"name\":\"notes\""));
    assert!(read(out.join("recents.json")).starts_with("{\"second\":"));
    assert_eq!(
        sha256_hex(read(out.join("recents.json")).as_bytes()),
        read(out.join(RECENTS_HASH_FILE))
    );
    assert_eq!(sha256_hex(BLOG.as_bytes()), read(out.join(PROJECT_HASH_FILE)));

    clean(&config, &out).unwrap();
    assert!(!out.join("b").exists());
    assert!(!out.join("index.html").exists());
    assert!(!out.join("rss.xml").exists());
    assert!(!out.join(RECENTS_HASH_FILE).exists());
    assert!(!out.join(PROJECT_HASH_FILE).exists());
}

#[test]
fn failed_post_skips_site_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(
        dir.path(),
        r#"{"posts": {
            "empty": {"title": "Empty", "content": "   ", "created": 1684000000.0},
            "fine": {"title": "Fine", "content": "words", "created": 1683000000.0}
        }}"#,
    );
    let out = dir.path().join("site");

    match build_site(&config, &dir.path().join(CONFIG_FILE), &out) {
        Err(Error::Failed(slugs)) => assert_eq!(vec!["empty".to_owned()], slugs),
        other => panic!("expected a failed build, got {:?}", other.map(|o| o.posts.len())),
    }
    assert!(out.join("b/fine/index.html").exists());
    assert!(!out.join("b/empty/index.html").exists());
    assert!(!out.join("index.html").exists());
    assert!(!out.join("rss.xml").exists());
}

#[test]
fn rebuild_drops_stale_posts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = project(dir.path(), BLOG);
    let path = dir.path().join(CONFIG_FILE);
    let out = dir.path().join("site");
    build_site(&config, &path, &out).unwrap();

    config.posts.remove("first").unwrap();
    build_site(&config, &path, &out).unwrap();
    assert!(out.join("b/second/index.html").exists());
    assert!(!out.join("b/first").exists());
}

#[test]
fn save_keeps_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), BLOG);
    let path = dir.path().join(CONFIG_FILE);
    config.save(&path).unwrap();
    let saved = read(&path);
    assert!(saved.contains("\"editor\""));
    assert!(saved.find("\"second\"") < saved.find("\"first\""));
}

#[test]
fn edited_post_shows_edit_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = project(dir.path(), BLOG);
    let path = dir.path().join(CONFIG_FILE);
    let now = chrono::DateTime::from_timestamp(1690000000, 0).unwrap();
    let edit = Edit {
        description: Some("now edited".to_owned()),
        ..Edit::default()
    };
    config.posts.edit("first", edit, now).unwrap();
    config.save(&path).unwrap();

    let config = Config::load(&path).unwrap();
    let out = dir.path().join("site");
    build_site(&config, &path, &out).unwrap();
    let first = read(out.join("b/first/index.html"));
    assert!(first.contains("edited on <time>2023-07-22 04:26:40</time>"));
    assert!(read(out.join("sitemap.xml")).contains(
        "<loc>https://notes.example.org/b/first</loc>\n    <lastmod>2023-07-22T04:26:40+00:00</lastmod>"
    ));
}
