//! Loads and saves the `blog.json` project file. The file holds both the site
//! settings and the posts themselves (see [`crate::post`]); every key is
//! optional and falls back to the defaults in [`Config::default`]. Keys this
//! crate doesn't know about are carried through [`Config::extra`] and written
//! back unchanged.

use crate::markdown::{plugin_options, DEFAULT_PLUGINS};
use crate::post::Corpus;
use crate::slug::Stopwords;
use crate::stats::Rankings;
use pulldown_cmark::Options;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// The default project file name.
pub const CONFIG_FILE: &str = "blog.json";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub title: String,
    pub header: String,
    pub description: String,

    /// The directory, relative to the output root, holding one directory per
    /// post. Also the URL path prefix for posts.
    pub posts_dir: String,
    pub assets_dir: String,
    pub rss_file: String,
    pub blog_keywords: Vec<String>,

    /// Keywords added to every post page's keyword list.
    pub default_keywords: Vec<String>,
    pub website: String,

    /// The public base URL of the blog. Post, feed and sitemap links are
    /// joined onto it.
    pub blog: String,
    pub source: String,
    pub visitor_count: String,
    pub comment: String,
    pub theme: Theme,

    /// Extra web manifest members, merged over the generated ones.
    pub manifest: Map<String, Value>,
    pub author: String,
    pub locale: String,

    /// The number of posts in `recents.json`.
    pub recents: usize,

    /// The JSON indentation used when saving this file.
    pub indent: usize,

    /// Markdown extensions to enable, e.g. `footnotes` or `table`.
    pub markdown_plugins: Vec<String>,

    /// Words dropped from slugs.
    pub context_words: Vec<String>,
    pub wslug_limit: usize,
    pub slug_limit: usize,
    pub license: String,
    pub recent_title_trunc: usize,
    pub post_preview_size: usize,
    pub read_wpm: u64,
    pub top_words: usize,
    pub top_tags: usize,

    /// The directory, relative to the output root, of the stats page.
    pub stats_dir: String,
    pub posts: Corpus,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub primary: String,
    pub secondary: String,

    /// The `color-scheme`, e.g. `dark` or `light`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            primary: "#000".to_owned(),
            secondary: "#fff".to_owned(),
            kind: "dark".to_owned(),
        }
    }
}

/// The pipeline-wide settings derived from a [`Config`].
#[derive(Clone, Debug)]
pub struct Settings {
    pub stopwords: Stopwords,
    pub max_words: usize,
    pub max_chars: usize,
    pub read_wpm: u64,
    pub rankings: Rankings,
    pub markdown: Options,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let keywords = strings(&["blog", "blog page", "blog post", "personal", "website"]);
        let manifest = match json!({
            "icons": [{"src": "/favicon.ico", "sizes": "128x128", "type": "image/png"}]
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Config {
            title: "blog".to_owned(),
            header: "blog".to_owned(),
            description: "my blog page".to_owned(),
            posts_dir: "b".to_owned(),
            assets_dir: "content".to_owned(),
            rss_file: "rss.xml".to_owned(),
            blog_keywords: keywords.clone(),
            default_keywords: keywords,
            website: "https://example.com".to_owned(),
            blog: "https://blog.example.com".to_owned(),
            source: "/git".to_owned(),
            visitor_count: "/visit".to_owned(),
            comment: "/c".to_owned(),
            theme: Theme::default(),
            manifest,
            author: "John Doe".to_owned(),
            locale: "en_GB".to_owned(),
            recents: 14,
            indent: 4,
            markdown_plugins: strings(DEFAULT_PLUGINS),
            context_words: strings(&[
                "the", "a", "about", "etc", "on", "at", "in", "by", "its", "i", "to", "my", "of",
                "between", "because", "or", "how", "begin", "is", "this", "person", "important",
                "homework", "and", "cause", "what", "for", "with", "without", "using", "im",
            ]),
            wslug_limit: 10,
            slug_limit: 96,
            license: "GPL-3.0-or-later".to_owned(),
            recent_title_trunc: 32,
            post_preview_size: 196,
            read_wpm: 150,
            top_words: 10,
            top_tags: 10,
            stats_dir: "stats".to_owned(),
            posts: Corpus::default(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Loads the project file at `path`, or the defaults if it doesn't exist.
    /// The corpus is sorted on load.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!(path = %path.display(), "no project file, using defaults");
            return Ok(Config::default());
        }

        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let mut config: Config =
            serde_json::from_reader(BufReader::new(file)).map_err(|err| Error::Parse {
                path: path.to_owned(),
                err,
            })?;
        config.posts.sort();
        Ok(config)
    }

    /// Writes the configuration to `path` as JSON indented by
    /// [`Config::indent`] spaces.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_error = |err| Error::Write {
            path: path.to_owned(),
            err,
        };
        let indent = " ".repeat(self.indent);
        let mut writer = BufWriter::new(File::create(path).map_err(write_error)?);
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut writer,
            PrettyFormatter::with_indent(indent.as_bytes()),
        );
        self.serialize(&mut serializer)?;
        writer.write_all(b"\n").map_err(write_error)?;
        writer.flush().map_err(write_error)
    }

    pub fn pipeline(&self) -> Settings {
        Settings {
            stopwords: Stopwords::new(&self.context_words),
            max_words: self.wslug_limit,
            max_chars: self.slug_limit,
            read_wpm: self.read_wpm,
            rankings: Rankings {
                words: self.top_words,
                tags: self.top_tags,
            },
            markdown: plugin_options(self.markdown_plugins.as_slice()),
        }
    }

    /// The site-relative path of a post, e.g. `b/my-trip`.
    pub fn post_path(&self, slug: &str) -> String {
        format!("{}/{}", self.posts_dir.trim_end_matches('/'), slug)
    }

    /// The output directory of a post's page.
    pub fn post_directory(&self, output: &Path, slug: &str) -> PathBuf {
        output.join(&self.posts_dir).join(slug)
    }

    /// Joins `path` onto the blog's base URL. The base is treated as a
    /// directory whether or not it ends in `/`.
    pub fn blog_url(&self, path: &str) -> Result<Url> {
        let mut base = Url::parse(&self.blog)?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    pub fn post_url(&self, slug: &str) -> Result<Url> {
        self.blog_url(&self.post_path(slug))
    }
}

/// The result of a fallible configuration operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading, saving or interpreting the project file.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the project file exists but can't be opened.
    #[error("opening project file `{}`: {err}", path.display())]
    Open { path: PathBuf, err: io::Error },

    /// Returned when the project file isn't valid.
    #[error("parsing project file `{}`: {err}", path.display())]
    Parse {
        path: PathBuf,
        err: serde_json::Error,
    },

    /// Returned when the project file can't be written.
    #[error("writing project file `{}`: {err}", path.display())]
    Write { path: PathBuf, err: io::Error },

    /// Returned when serializing the configuration fails.
    #[error("serializing project file: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Returned when a configured URL can't be parsed or joined.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
