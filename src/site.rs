//! The small site-wide files: `robots.txt`, the web manifest, the
//! `recents.json` API and the SHA-256 hash files next to the published JSON,
//! plus the list of everything a build generates (used by
//! [`crate::build::clean`]).

use crate::config::Config;
use crate::post::to_epoch;
use crate::util::trunc;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const SITEMAP_FILE: &str = "sitemap.xml";
pub const ROBOTS_FILE: &str = "robots.txt";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const RECENTS_FILE: &str = "recents.json";
pub const RECENTS_HASH_FILE: &str = "recents_json_hash.txt";
pub const PROJECT_HASH_FILE: &str = "blog_json_hash.txt";

/// The paths, relative to the output root, of every generated artifact.
pub fn artifacts(config: &Config) -> Vec<PathBuf> {
    vec![
        PathBuf::from(&config.posts_dir),
        PathBuf::from(&config.stats_dir),
        PathBuf::from("index.html"),
        PathBuf::from(MANIFEST_FILE),
        PathBuf::from(RECENTS_FILE),
        PathBuf::from(RECENTS_HASH_FILE),
        PathBuf::from(PROJECT_HASH_FILE),
        PathBuf::from(&config.rss_file),
        PathBuf::from(ROBOTS_FILE),
        PathBuf::from(SITEMAP_FILE),
    ]
}

pub fn robots(config: &Config) -> String {
    format!(
        "User-agent: *\nDisallow: /{}/*\nAllow: *\nSitemap: {}/{}",
        config.assets_dir,
        config.blog.trim_end_matches('/'),
        SITEMAP_FILE
    )
}

/// The web manifest. Members of the configured `manifest` object override the
/// generated ones.
pub fn manifest(config: &Config) -> Value {
    let mut members = match json!({
        "$schema": "https://json.schemastore.org/web-manifest-combined.json",
        "short_name": config.header,
        "name": config.title,
        "description": config.description,
        "start_url": ".",
        "display": "standalone",
        "theme_color": config.theme.primary,
        "background_color": config.theme.secondary,
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in &config.manifest {
        members.insert(key.clone(), value.clone());
    }
    Value::Object(members)
}

/// The `recents` most recent posts keyed by slug, in corpus order, with
/// their content cut to `post-preview-size` characters.
pub struct Recents<'a>(pub &'a Config);

#[derive(Serialize)]
struct Recent<'a> {
    title: &'a str,
    content: String,
    created: f64,
}

impl Serialize for Recents<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let config = self.0;
        serializer.collect_map(config.posts.iter().take(config.recents).map(|post| {
            (
                &post.slug,
                Recent {
                    title: &post.title,
                    content: trunc(&post.content, config.post_preview_size, ""),
                    created: to_epoch(&post.created),
                },
            )
        }))
    }
}

pub fn write_robots(config: &Config, output: &Path) -> Result<PathBuf> {
    let path = output.join(ROBOTS_FILE);
    std::fs::write(&path, robots(config))?;
    debug!(path = %path.display(), "generated");
    Ok(path)
}

pub fn write_manifest(config: &Config, output: &Path) -> Result<PathBuf> {
    write_json(&output.join(MANIFEST_FILE), &manifest(config))
}

pub fn write_recents(config: &Config, output: &Path) -> Result<PathBuf> {
    write_json(&output.join(RECENTS_FILE), &Recents(config))
}

/// The lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Writes the digest of the file at `source` to `output/{hash_file}`.
pub fn write_hash(source: &Path, output: &Path, hash_file: &str) -> Result<PathBuf> {
    let path = output.join(hash_file);
    std::fs::write(&path, sha256_hex(&std::fs::read(source)?))?;
    debug!(path = %path.display(), source = %source.display(), "generated");
    Ok(path)
}

/// Writes `recents.json` and its hash file, and the hash file of the project
/// file at `project` when it exists.
pub fn write_apis(config: &Config, project: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let recents = write_recents(config, output)?;
    let hash = write_hash(&recents, output, RECENTS_HASH_FILE)?;
    let mut written = vec![recents, hash];
    match project.exists() {
        true => written.push(write_hash(project, output, PROJECT_HASH_FILE)?),
        false => debug!(path = %project.display(), "no project file to hash"),
    }
    Ok(written)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    debug!(path = %path.display(), "generated");
    Ok(path.to_owned())
}

/// The result of writing a site-wide file.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("serializing json: {0}")]
    Json(#[from] serde_json::Error),
}
