//! Converts posts, the corpus and the statistics into [`Value`]s for the page
//! templates. Every piece of user text goes through [`escape_html`] here;
//! rendered post HTML is the only value inserted as-is.

use crate::build::PostPage;
use crate::config::Config;
use crate::post::{Corpus, Post};
use crate::stats::{AggregateStats, Bucket, Histogram, Ranked};
use crate::util::{escape_html, format_time, trunc};
use gtmpl::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

fn object<I: IntoIterator<Item = (&'static str, Value)>>(fields: I) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect::<HashMap<String, Value>>(),
    )
}

fn text(s: &str) -> Value {
    Value::String(escape_html(s))
}

fn shown<T: Display>(x: T) -> Value {
    Value::String(x.to_string())
}

fn fixed(x: f64) -> Value {
    Value::String(format!("{:.2}", x))
}

/// The fields every page's `head` template uses.
fn head(config: &Config, path: &str, keywords: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("keywords", text(keywords)),
        ("theme_type", text(&config.theme.kind)),
        ("theme_primary", text(&config.theme.primary)),
        ("styles", text(&format!("{}/styles.css", config.assets_dir))),
        ("rss", text(&config.rss_file)),
        ("blog_title", text(&config.title)),
        ("author", text(&config.author)),
        ("generator", text(concat!("scribe ", env!("CARGO_PKG_VERSION")))),
        ("locale", text(&config.locale)),
        ("license", text(&config.license)),
        (
            "canonical",
            text(&format!("{}/{}", config.blog.trim_end_matches('/'), path)),
        ),
        ("visitor_count", text(&config.visitor_count)),
        ("comment", text(&config.comment)),
        ("website", text(&config.website)),
        ("source", text(&config.source)),
        ("stats", text(&config.stats_dir)),
    ]
}

pub fn post(config: &Config, post: &Post, page: &PostPage) -> Value {
    let keywords: BTreeSet<&str> = post
        .keywords
        .iter()
        .chain(config.default_keywords.iter())
        .map(String::as_str)
        .collect();
    let keywords = keywords.into_iter().collect::<Vec<_>>().join(", ");

    let mut fields = head(config, &config.post_path(&post.slug), &keywords);
    fields.extend([
        ("title", text(&post.title)),
        ("description", text(&post.description)),
        ("created", text(&format_time(&post.created))),
        (
            "edited",
            match &post.edited {
                Some(edited) => text(&format_time(edited)),
                None => Value::Nil,
            },
        ),
        ("read_time", text(&page.read_time.text)),
        ("content", Value::String(page.html.to_owned())),
    ]);
    object(fields)
}

pub fn index(config: &Config, corpus: &Corpus) -> Value {
    let mut fields = head(config, "", &config.blog_keywords.join(", "));
    fields.extend([
        ("description", text(&config.description)),
        ("header", text(&config.header)),
        (
            "latest",
            match corpus.latest() {
                Some(latest) => object([
                    ("path", text(&config.post_path(&latest.slug))),
                    ("title", text(&trunc(&latest.title, config.recent_title_trunc, " ..."))),
                    ("created", text(&format_time(&latest.created))),
                ]),
                None => Value::Nil,
            },
        ),
        (
            "posts",
            Value::Array(
                corpus
                    .iter()
                    .map(|p| {
                        object([
                            ("path", text(&config.post_path(&p.slug))),
                            ("title", text(&p.title)),
                        ])
                    })
                    .collect(),
            ),
        ),
    ]);
    object(fields)
}

pub fn stats(config: &Config, stats: &AggregateStats) -> Value {
    let mut fields = head(config, &config.stats_dir, &config.blog_keywords.join(", "));
    fields.extend([
        ("description", text(&config.description)),
        ("header", text(&config.header)),
        ("summary", Value::from(stats)),
    ]);
    object(fields)
}

impl From<&Ranked> for Value {
    fn from(r: &Ranked) -> Value {
        object([("name", text(&r.name)), ("count", shown(r.count))])
    }
}

impl<K: Display> From<&Bucket<K>> for Value {
    fn from(b: &Bucket<K>) -> Value {
        object([
            ("key", shown(&b.key)),
            ("count", shown(b.count)),
            ("percent", fixed(b.percent)),
        ])
    }
}

impl<K: Display> From<&Histogram<K>> for Value {
    fn from(h: &Histogram<K>) -> Value {
        object([
            ("buckets", Value::Array(h.buckets.iter().map(Value::from).collect())),
            ("average", fixed(h.average)),
        ])
    }
}

impl From<&AggregateStats> for Value {
    /// Converts [`AggregateStats`] into a [`Value`] for the stats page. Counts
    /// are rendered as integers and averages with two decimals.
    fn from(s: &AggregateStats) -> Value {
        let ranked = |list: &[Ranked]| Value::Array(list.iter().map(Value::from).collect());
        object([
            ("posts", shown(s.posts)),
            ("chars", shown(s.chars)),
            ("words", shown(s.words)),
            ("tags", shown(s.tags)),
            ("read_minutes", shown(s.read_seconds.div_ceil(60))),
            ("avg_chars", fixed(s.avg_chars)),
            ("avg_words", fixed(s.avg_words)),
            ("avg_tags", fixed(s.avg_tags)),
            ("avg_read_seconds", fixed(s.avg_read_seconds)),
            ("avg_word_length", fixed(s.avg_word_length)),
            ("top_words", ranked(&s.top_words)),
            ("top_tags", ranked(&s.top_tags)),
            ("by_year", Value::from(&s.by_year)),
            ("by_month", Value::from(&s.by_month)),
            ("by_day", Value::from(&s.by_day)),
            ("by_hour", Value::from(&s.by_hour)),
        ])
    }
}
