//! Sitemap generation.
//!
//! The sitemap lists the website, the blog, the feed and every post:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://blog.example.com/b/my-trip</loc>
//!     <lastmod>2023-05-01T10:00:00+00:00</lastmod>
//!     <priority>1.0</priority>
//!   </url>
//! </urlset>
//! ```

use crate::config::{Config, Error as ConfigError};
use crate::post::Corpus;
use crate::util::escape_html;
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use thiserror::Error;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

struct UrlEntry {
    loc: String,
    lastmod: DateTime<Utc>,
}

/// Renders the sitemap. The site-level entries are stamped with `now`; a
/// post's `lastmod` is its edit time, or its creation time if never edited.
pub fn sitemap(config: &Config, corpus: &Corpus, now: DateTime<Utc>) -> Result<String> {
    let mut urls = vec![
        UrlEntry {
            loc: config.website.clone(),
            lastmod: now,
        },
        UrlEntry {
            loc: config.blog.clone(),
            lastmod: now,
        },
        UrlEntry {
            loc: config.blog_url(&config.rss_file)?.to_string(),
            lastmod: now,
        },
    ];
    for post in corpus.iter() {
        urls.push(UrlEntry {
            loc: config.post_url(&post.slug)?.to_string(),
            lastmod: post.last_modified(),
        });
    }

    let mut xml = String::with_capacity(256 * urls.len());
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<urlset xmlns="{}">"#, SITEMAP_NS));
    xml.push('\n');
    for entry in urls {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_html(&entry.loc)));
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            entry.lastmod.format("%Y-%m-%dT%H:%M:%S+00:00")
        ));
        xml.push_str("    <priority>1.0</priority>\n");
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    Ok(xml)
}

pub fn write_sitemap<W: Write>(config: &Config, corpus: &Corpus, now: DateTime<Utc>, mut w: W) -> Result<()> {
    w.write_all(sitemap(config, corpus, now)?.as_bytes())?;
    w.flush()?;
    Ok(())
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("writing sitemap: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
