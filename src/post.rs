//! Defines the [`Post`] and [`Corpus`] types and the on-disk layout of the
//! `posts` map in `blog.json`:
//!
//! ```json
//! "posts": {
//!     "my-trip": {
//!         "title": "My Trip",
//!         "description": "...",
//!         "content": "markdown source",
//!         "keywords": ["travel"],
//!         "created": 1700000000.25,
//!         "edited": 1700000500.0
//!     }
//! }
//! ```
//!
//! Timestamps are fractional UNIX seconds (UTC). The map's key order is the
//! corpus order and is preserved when reading and writing.

use crate::config::Settings;
use crate::slug::{self, slugify, SlugSet};
use chrono::{DateTime, Utc};
use deunicode::deunicode;
use rustc_hash::FxHashSet;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A single blog post. The slug is assigned once, when the post is added to a
/// [`Corpus`], and never changes afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub description: String,

    /// The markdown source.
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub edited: Option<DateTime<Utc>>,
}

impl Post {
    /// The time the post last changed: `edited` when set, `created` otherwise.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.edited.unwrap_or(self.created)
    }
}

/// The fields of a new post, before a slug and a creation time are assigned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Draft {
    pub title: String,
    pub description: String,
    pub content: String,
    pub keywords: BTreeSet<String>,
}

/// Changes to an existing post. Fields left as `None` are kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Edit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub keywords: Option<BTreeSet<String>>,
}

impl Edit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.keywords.is_none()
    }
}

/// The ordered collection of posts. The build pipeline expects the order to be
/// descending by creation time (see [`Corpus::sort`]) and treats element 0 as
/// the latest post; it never reorders the corpus itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Corpus {
    posts: Vec<Post>,
}

impl Corpus {
    pub fn new(posts: Vec<Post>) -> Self {
        Corpus { posts }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.slug == slug)
    }

    /// Orders posts by descending creation time. The sort is stable, so posts
    /// created at the same instant keep their relative order.
    pub fn sort(&mut self) {
        self.posts.sort_by(|a, b| b.created.cmp(&a.created));
    }

    /// Returns the most recent post, assuming the corpus is sorted.
    pub fn latest(&self) -> Option<&Post> {
        self.posts.first()
    }

    /// Returns the post-slug namespace.
    pub fn slugs(&self) -> SlugSet {
        self.posts.iter().map(|p| p.slug.clone()).collect()
    }

    /// Adds a post created at `created` from `draft`. The slug is derived from
    /// the title and made unique against the existing posts. The new post is
    /// inserted at the front of the corpus.
    pub fn add(&mut self, draft: Draft, created: DateTime<Utc>, settings: &Settings) -> Result<&Post> {
        if draft.title.trim().is_empty() {
            return Err(Error::EmptyTitle);
        }

        let base = slugify(
            &draft.title,
            &settings.stopwords,
            settings.max_words,
            settings.max_chars,
        );
        let slug = self.slugs().claim_counted(base)?;
        self.posts.insert(
            0,
            Post {
                slug,
                title: draft.title,
                description: draft.description.trim().to_owned(),
                content: draft.content,
                keywords: draft.keywords,
                created,
                edited: None,
            },
        );
        Ok(&self.posts[0])
    }

    /// Applies `edit` to the post with the given slug and stamps it as edited
    /// at `now`. The slug never changes, even when the title does.
    pub fn edit(&mut self, slug: &str, edit: Edit, now: DateTime<Utc>) -> Result<&Post> {
        if edit.is_empty() {
            return Err(Error::EmptyEdit(slug.to_owned()));
        }
        if matches!(&edit.title, Some(title) if title.trim().is_empty()) {
            return Err(Error::EmptyTitle);
        }
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.slug == slug)
            .ok_or_else(|| Error::NotFound(slug.to_owned()))?;

        if let Some(title) = edit.title {
            post.title = title;
        }
        if let Some(description) = edit.description {
            post.description = description.trim().to_owned();
        }
        if let Some(content) = edit.content {
            post.content = content;
        }
        if let Some(keywords) = edit.keywords {
            post.keywords = keywords;
        }
        post.edited = Some(now);
        Ok(&*post)
    }

    /// Removes and returns the post with the given slug.
    pub fn remove(&mut self, slug: &str) -> Result<Post> {
        match self.posts.iter().position(|p| p.slug == slug) {
            Some(i) => Ok(self.posts.remove(i)),
            None => Err(Error::NotFound(slug.to_owned())),
        }
    }
}

/// Parses a comma-separated keyword list. Entries are trimmed, lowercased
/// and transliterated; empty entries and duplicates are dropped.
pub fn parse_keywords(input: &str) -> BTreeSet<String> {
    input
        .split(',')
        .map(|k| deunicode(k.trim()).to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Converts a timestamp into fractional UNIX seconds.
pub fn to_epoch(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1e6
}

/// Converts fractional UNIX seconds into a timestamp. Returns `None` for
/// values that are not finite or out of range.
pub fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let micros = ((seconds - whole) * 1e6).round() as u32;
    DateTime::from_timestamp(whole as i64, micros.min(999_999) * 1_000)
}

// The stored form of a post; the slug is the map key.
#[derive(Deserialize)]
struct Record {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    keywords: BTreeSet<String>,
    created: f64,
    #[serde(default)]
    edited: Option<f64>,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    title: &'a str,
    description: &'a str,
    content: &'a str,
    keywords: &'a BTreeSet<String>,
    created: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    edited: Option<f64>,
}

impl Serialize for Corpus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.posts.iter().map(|p| {
            (
                &p.slug,
                RecordRef {
                    title: &p.title,
                    description: &p.description,
                    content: &p.content,
                    keywords: &p.keywords,
                    created: to_epoch(&p.created),
                    edited: p.edited.as_ref().map(to_epoch),
                },
            )
        }))
    }
}

impl<'de> Deserialize<'de> for Corpus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Corpus, D::Error> {
        deserializer.deserialize_map(CorpusVisitor)
    }
}

struct CorpusVisitor;

impl<'de> Visitor<'de> for CorpusVisitor {
    type Value = Corpus;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of post slugs to posts")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Corpus, A::Error> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut posts = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((slug, record)) = map.next_entry::<String, Record>()? {
            if !seen.insert(slug.clone()) {
                return Err(de::Error::custom(format!("duplicate post slug `{}`", slug)));
            }
            let timestamp = |seconds: f64| {
                from_epoch(seconds).ok_or_else(|| {
                    <A::Error as de::Error>::custom(format!(
                        "post `{}`: timestamp {} is out of range",
                        slug, seconds
                    ))
                })
            };
            let created = timestamp(record.created)?;
            let edited = match record.edited {
                Some(seconds) => Some(timestamp(seconds)?),
                None => None,
            };
            posts.push(Post {
                slug,
                title: record.title,
                description: record.description,
                content: record.content,
                keywords: record.keywords,
                created,
                edited,
            });
        }
        Ok(Corpus { posts })
    }
}

/// The result of a fallible corpus operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed corpus operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when removing or looking up a slug that isn't in the corpus.
    #[error("no post with slug `{0}`")]
    NotFound(String),

    /// Returned when adding a post without a title, or editing one to have
    /// none.
    #[error("a post needs a title")]
    EmptyTitle,

    /// Returned when an edit doesn't change any field.
    #[error("nothing to edit in post `{0}`")]
    EmptyEdit(String),

    /// Returned when no free slug could be claimed for a new post.
    #[error(transparent)]
    Slug(#[from] slug::Error),
}
