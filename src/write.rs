//! Exports [`SiteWriter`], which templates and writes the HTML pages: one page
//! per post (as the [`PageWriter`] of the build), the index page and the stats
//! page. The templates are compiled into the binary from `templates/`; each
//! page template is parsed together with the shared `head.html` definitions.

use crate::build::{PageWriter, PostPage};
use crate::config::Config;
use crate::post::{Corpus, Post};
use crate::stats::AggregateStats;
use crate::value;
use gtmpl::{Context, Template, Value};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEAD_TEMPLATE: &str = include_str!("../templates/head.html");
const POST_TEMPLATE: &str = include_str!("../templates/post.html");
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const STATS_TEMPLATE: &str = include_str!("../templates/stats.html");

/// Responsible for templating and writing HTML pages to disk.
pub struct SiteWriter<'a> {
    config: &'a Config,

    /// The root output directory. Post pages go to
    /// `{output}/{posts_dir}/{slug}/index.html`, the index page to
    /// `{output}/index.html` and the stats page to
    /// `{output}/{stats_dir}/index.html`.
    output: &'a Path,
    post_template: Template,
    index_template: Template,
    stats_template: Template,
}

impl<'a> SiteWriter<'a> {
    pub fn new(config: &'a Config, output: &'a Path) -> Result<Self> {
        Ok(SiteWriter {
            config,
            output,
            post_template: parse_template(POST_TEMPLATE)?,
            index_template: parse_template(INDEX_TEMPLATE)?,
            stats_template: parse_template(STATS_TEMPLATE)?,
        })
    }

    /// Writes `index.html`, listing every post in corpus order.
    pub fn write_index(&self, corpus: &Corpus) -> Result<PathBuf> {
        self.write_page(
            &self.index_template,
            value::index(self.config, corpus),
            self.output.join("index.html"),
        )
    }

    /// Writes the stats page from the closed statistics.
    pub fn write_stats(&self, stats: &AggregateStats) -> Result<PathBuf> {
        let dir = self.output.join(&self.config.stats_dir);
        std::fs::create_dir_all(&dir)?;
        self.write_page(
            &self.stats_template,
            value::stats(self.config, stats),
            dir.join("index.html"),
        )
    }

    /// Takes a single page value, templates it, and writes it to `path`.
    fn write_page(&self, template: &Template, value: Value, path: PathBuf) -> Result<PathBuf> {
        let context = Context::from(value).map_err(|e| Error::Template(e.to_string()))?;
        let mut html: Vec<u8> = Vec::new();
        template
            .execute(&mut html, &context)
            .map_err(|e| Error::Template(e.to_string()))?;
        std::fs::write(&path, html)?;
        Ok(path)
    }
}

impl PageWriter for SiteWriter<'_> {
    fn write_post(&self, post: &Post, page: &PostPage) -> Result<PathBuf> {
        let dir = self.config.post_directory(self.output, &post.slug);
        std::fs::create_dir_all(&dir)?;
        self.write_page(
            &self.post_template,
            value::post(self.config, post, page),
            dir.join("index.html"),
        )
    }
}

// Appends `page` to the shared definitions and parses the result.
fn parse_template(page: &str) -> Result<Template> {
    let mut contents = String::with_capacity(HEAD_TEMPLATE.len() + page.len());
    contents.push_str(HEAD_TEMPLATE);
    contents.push_str(page);

    let mut template = Template::default();
    template
        .parse(&contents)
        .map_err(|e| Error::Template(e.to_string()))?;
    Ok(template)
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// An error during template parsing or execution.
    #[error("template: {0}")]
    Template(String),

    /// An error writing the output files.
    #[error(transparent)]
    Io(#[from] io::Error),
}
