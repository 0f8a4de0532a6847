//! Exports [`build_all`], the fork/join stage that renders and writes every
//! post concurrently while feeding one [`Aggregator`], and [`build_site`],
//! which wraps it with the site-wide steps: cleaning the posts directory,
//! then (only once every post task has finished and succeeded) writing the
//! index page, the stats page, the feed, the sitemap and the small static
//! files ([`crate::site`]).

use crate::config::{Config, Settings};
use crate::feed::{write_feed, Error as FeedError};
use crate::markdown::{PlainText, ReadTime, Renderer};
use crate::post::Post;
use crate::site::{self, Error as SiteError};
use crate::sitemap::{write_sitemap, Error as SitemapError};
use crate::stats::{AggregateStats, Aggregator, Measurement};
use crate::util::remove_path;
use crate::write::{Error as WriteError, SiteWriter};
use chrono::Utc;
use std::any::Any;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// The rendered body of one post, handed to a [`PageWriter`].
pub struct PostPage<'a> {
    pub html: &'a str,
    pub read_time: &'a ReadTime,
}

/// Writes one post's page and returns the path it was written to. Called
/// from many build threads at once.
pub trait PageWriter: Sync {
    fn write_post(&self, post: &Post, page: &PostPage) -> std::result::Result<PathBuf, WriteError>;
}

/// The output of one successful post task.
#[derive(Clone, Debug)]
pub struct BuiltPost {
    pub slug: String,
    pub path: PathBuf,
    pub html: String,
    pub read_time: ReadTime,
    pub measurement: Measurement,
}

/// A post task that failed.
#[derive(Debug)]
pub struct TaskFailure {
    pub slug: String,
    pub error: TaskError,
}

/// The reason a post task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Returned for posts without any content.
    #[error("post has no content")]
    EmptyContent,

    /// Returned when the post's page couldn't be written.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Returned when the OS refused to start the task's thread.
    #[error("spawning build thread: {0}")]
    Spawn(io::Error),

    /// Returned when the task panicked.
    #[error("build thread panicked: {0}")]
    Panicked(String),
}

/// The joined result of [`build_all`].
#[derive(Debug)]
pub struct BuildOutcome {
    /// Successfully built posts, in corpus order.
    pub posts: Vec<BuiltPost>,

    /// Failed posts, in corpus order.
    pub failures: Vec<TaskFailure>,

    /// The statistics over the successfully built posts.
    pub stats: AggregateStats,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_slugs(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.slug.clone()).collect()
    }
}

/// Builds every post on its own thread and blocks until all of them have
/// finished. A failing post never stops its siblings; its failure is
/// collected in [`BuildOutcome::failures`] instead. The aggregator is closed
/// only after every thread has been joined.
pub fn build_all<W: PageWriter>(
    posts: &[Post],
    renderer: &Renderer,
    writer: &W,
    settings: &Settings,
) -> BuildOutcome {
    let aggregator = Aggregator::open(settings.rankings);

    let results: Vec<std::result::Result<BuiltPost, TaskError>> = thread::scope(|scope| {
        let aggregator = &aggregator;
        let handles: Vec<_> = posts
            .iter()
            .enumerate()
            .map(|(order, post)| {
                thread::Builder::new()
                    .name(format!("build-{}", post.slug))
                    .spawn_scoped(scope, move || {
                        build_post(order, post, renderer, writer, settings.read_wpm, aggregator)
                    })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic)))),
                Err(err) => Err(TaskError::Spawn(err)),
            })
            .collect()
    });

    let mut outcome_posts = Vec::with_capacity(posts.len());
    let mut failures = Vec::new();
    for (post, result) in posts.iter().zip(results) {
        match result {
            Ok(built) => outcome_posts.push(built),
            Err(error) => {
                error!(slug = %post.slug, %error, "failed to build post");
                failures.push(TaskFailure {
                    slug: post.slug.clone(),
                    error,
                });
            }
        }
    }

    BuildOutcome {
        posts: outcome_posts,
        failures,
        stats: aggregator.close(),
    }
}

fn build_post<W: PageWriter>(
    order: usize,
    post: &Post,
    renderer: &Renderer,
    writer: &W,
    read_wpm: u64,
    aggregator: &Aggregator,
) -> std::result::Result<BuiltPost, TaskError> {
    let start = Instant::now();
    if post.content.trim().is_empty() {
        return Err(TaskError::EmptyContent);
    }

    let rendered = renderer.render(&post.content);
    let text = PlainText::of_markdown(&post.content);
    let read_time = ReadTime::of(&text, read_wpm);
    let path = writer.write_post(
        post,
        &PostPage {
            html: &rendered.html,
            read_time: &read_time,
        },
    )?;

    let measurement = Measurement::new(order, post, &text, &read_time);
    aggregator.report(measurement.clone());
    info!(slug = %post.slug, elapsed = ?start.elapsed(), "built post");

    Ok(BuiltPost {
        slug: post.slug.clone(),
        path,
        html: rendered.html,
        read_time,
        measurement,
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast_ref::<&str>() {
            Some(message) => message.to_string(),
            None => "unknown panic".to_owned(),
        },
    }
}

/// Builds the whole site from a [`Config`] loaded from `project` into
/// `output`. The posts directory is deleted and rebuilt. The site-wide files are only written when every
/// post built; otherwise this returns [`Error::Failed`] naming the failed
/// slugs, and the pages of the posts that did build stay on disk.
pub fn build_site(config: &Config, project: &Path, output: &Path) -> Result<BuildOutcome> {
    let start = Instant::now();
    let posts_directory = output.join(&config.posts_dir);
    rmdir(&posts_directory)?;
    std::fs::create_dir_all(&posts_directory)?;

    let settings = config.pipeline();
    let writer = SiteWriter::new(config, output)?;
    let outcome = build_all(
        config.posts.posts(),
        &Renderer::new().with_options(settings.markdown),
        &writer,
        &settings,
    );
    if !outcome.is_success() {
        return Err(Error::Failed(outcome.failed_slugs()));
    }

    let index = writer.write_index(&config.posts)?;
    debug!(path = %index.display(), "wrote index");
    let stats = writer.write_stats(&outcome.stats)?;
    debug!(path = %stats.display(), "wrote stats page");

    let now = Utc::now();
    write_feed(
        config,
        &config.posts,
        now,
        BufWriter::new(File::create(output.join(&config.rss_file))?),
    )?;
    write_sitemap(
        config,
        &config.posts,
        now,
        BufWriter::new(File::create(output.join(site::SITEMAP_FILE))?),
    )?;
    site::write_robots(config, output)?;
    site::write_manifest(config, output)?;
    site::write_apis(config, project, output)?;

    info!(
        posts = outcome.posts.len(),
        elapsed = ?start.elapsed(),
        "built site"
    );
    Ok(outcome)
}

/// Removes every generated artifact from `output`.
pub fn clean(config: &Config, output: &Path) -> Result<()> {
    for path in site::artifacts(config) {
        let path = output.join(path);
        debug!(path = %path.display(), "removing");
        remove_path(&path).map_err(|err| Error::Clean { path, err })?;
    }
    Ok(())
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

/// The result of a fallible site build.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when one or more posts failed to build.
    #[error("failed to build {}: {}", post_count(.0), .0.join(", "))]
    Failed(Vec<String>),

    /// Returned for errors writing pages.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Returned for errors writing the feed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Returned for errors writing the sitemap.
    #[error(transparent)]
    Sitemap(#[from] SitemapError),

    /// Returned for errors writing robots.txt, manifest.json, recents.json or
    /// the hash files.
    #[error(transparent)]
    Site(#[from] SiteError),

    /// Returned for I/O problems while cleaning output files.
    #[error("cleaning `{}`: {err}", path.display())]
    Clean { path: PathBuf, err: io::Error },

    /// Returned for other I/O errors.
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn post_count(slugs: &[String]) -> String {
    match slugs.len() {
        1 => "1 post".to_owned(),
        n => format!("{} posts", n),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::test::post_at;
    use parking_lot::Mutex;

    // Records pages in memory and fails for slugs in `fail`.
    #[derive(Default)]
    struct MemoryWriter {
        pages: Mutex<Vec<(String, String)>>,
        fail: Vec<String>,
    }

    impl PageWriter for MemoryWriter {
        fn write_post(
            &self,
            post: &Post,
            page: &PostPage,
        ) -> std::result::Result<PathBuf, WriteError> {
            if self.fail.contains(&post.slug) {
                return Err(WriteError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.pages
                .lock()
                .push((post.slug.clone(), page.html.to_owned()));
            Ok(PathBuf::from(&post.slug))
        }
    }

    fn corpus() -> Vec<Post> {
        vec![
            post_at("c", "# Intro\n\nc words here", &["x"], "2023-05-20T22:00:00Z"),
            post_at("b", "b words", &["x", "y"], "2023-05-02T10:30:00Z"),
            post_at("a", "a", &[], "2023-05-01T10:00:00Z"),
        ]
    }

    fn settings() -> Settings {
        Config::default().pipeline()
    }

    #[test]
    fn test_build_all_one_page_per_post() {
        let posts = corpus();
        let writer = MemoryWriter::default();
        let outcome = build_all(&posts, &Renderer::new(), &writer, &settings());

        assert!(outcome.is_success());
        let slugs: Vec<&str> = outcome.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(vec!["c", "b", "a"], slugs);
        assert_eq!(3, writer.pages.lock().len());
        assert_eq!(3, outcome.stats.posts);
        assert_eq!(1, outcome.stats.by_month.buckets.len());
        assert_eq!(3.0, outcome.stats.by_month.average);
        assert!(outcome.posts[0]
            .html
            .starts_with("<h2 id=\"intro\"><a href=\"#intro\">#</a> Intro</h2>"));
        assert_eq!("1 min", outcome.posts[0].read_time.text);
        assert_eq!(0, outcome.posts[0].measurement.order);
    }

    #[test]
    fn test_build_all_collects_failures_without_cancelling() {
        let mut posts = corpus();
        posts[2].content = "  \n".to_owned();
        let writer = MemoryWriter {
            fail: vec!["c".to_owned()],
            ..MemoryWriter::default()
        };
        let outcome = build_all(&posts, &Renderer::new(), &writer, &settings());

        assert!(!outcome.is_success());
        assert_eq!(vec!["c".to_owned(), "a".to_owned()], outcome.failed_slugs());
        assert!(matches!(outcome.failures[0].error, TaskError::Write(_)));
        assert!(matches!(outcome.failures[1].error, TaskError::EmptyContent));

        // `b` still built and is the only post counted.
        assert_eq!(1, outcome.posts.len());
        assert_eq!(1, outcome.stats.posts);
        assert_eq!(vec![("b".to_owned(), "<p>b words</p>\n".to_owned())], *writer.pages.lock());
    }

    #[test]
    fn test_build_all_panicking_writer() {
        struct PanickingWriter;
        impl PageWriter for PanickingWriter {
            fn write_post(&self, _: &Post, _: &PostPage) -> std::result::Result<PathBuf, WriteError> {
                panic!("boom")
            }
        }

        let posts = corpus();
        let outcome = build_all(&posts, &Renderer::new(), &PanickingWriter, &settings());
        assert_eq!(3, outcome.failures.len());
        assert!(matches!(&outcome.failures[0].error, TaskError::Panicked(m) if m == "boom"));
        assert_eq!(0, outcome.stats.posts);
    }

    #[test]
    fn test_build_all_empty_corpus() {
        let outcome = build_all(&[], &Renderer::new(), &MemoryWriter::default(), &settings());
        assert!(outcome.is_success());
        assert_eq!(0, outcome.stats.posts);
    }

    #[test]
    fn test_failed_error_message() {
        assert_eq!(
            "failed to build 2 posts: a, b",
            Error::Failed(vec!["a".to_owned(), "b".to_owned()]).to_string()
        );
        assert_eq!("failed to build 1 post: a", Error::Failed(vec!["a".to_owned()]).to_string());
    }
}
