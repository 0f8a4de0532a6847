//! Corpus-wide statistics. Every built post produces one [`Measurement`],
//! which is folded into a shared [`Aggregator`] from whichever build thread
//! produced it. Once all threads are joined the aggregator is closed into an
//! [`AggregateStats`] summary for the stats page.
//!
//! [`Aggregator::close`] consumes the aggregator, so it can't be closed twice
//! or fed after closing. While it is open it can be shared by reference
//! between scoped threads; each [`Aggregator::report`] takes an exclusive
//! lock around the fold.

use crate::markdown::{PlainText, ReadTime};
use crate::post::Post;
use chrono::{Datelike, Timelike};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-post metrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// The post's position in the corpus. Used to break ranking ties
    /// independently of the order in which measurements are reported.
    pub order: usize,
    pub read_seconds: u64,

    /// The total length in characters of the post's words.
    pub chars: u64,

    /// Word counts, in order of each word's first occurrence.
    pub words: Vec<(String, u64)>,

    /// Tag counts, in keyword order.
    pub tags: Vec<(String, u64)>,

    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl Measurement {
    /// Measures `post`, which sits at position `order` in the corpus. Words are
    /// the whitespace-separated tokens of `text`, trimmed of surrounding
    /// non-alphanumerics and lowercased.
    pub fn new(order: usize, post: &Post, text: &PlainText, read_time: &ReadTime) -> Self {
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let mut words: Vec<(String, u64)> = Vec::new();
        let mut chars = 0;
        for word in text.words().filter_map(normalize_word) {
            chars += word.chars().count() as u64;
            match index.get(&word) {
                Some(&i) => words[i].1 += 1,
                None => {
                    index.insert(word.clone(), words.len());
                    words.push((word, 1));
                }
            }
        }

        Measurement {
            order,
            read_seconds: read_time.seconds,
            chars,
            words,
            tags: post.keywords.iter().map(|k| (k.clone(), 1)).collect(),
            year: post.created.year(),
            month: post.created.month(),
            day: post.created.day(),
            hour: post.created.hour(),
        }
    }

    pub fn word_total(&self) -> u64 {
        self.words.iter().map(|(_, n)| n).sum()
    }

    pub fn tag_total(&self) -> u64 {
        self.tags.iter().map(|(_, n)| n).sum()
    }
}

fn normalize_word(token: &str) -> Option<String> {
    let word = token.trim_matches(|c: char| !c.is_alphanumeric());
    match word.is_empty() {
        true => None,
        false => Some(word.to_lowercase()),
    }
}

/// The sizes of the top-N rankings computed on close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rankings {
    pub words: usize,
    pub tags: usize,
}

impl Default for Rankings {
    fn default() -> Self {
        Rankings { words: 10, tags: 10 }
    }
}

/// An open statistics sink. See the module documentation for its lifecycle.
pub struct Aggregator {
    rankings: Rankings,
    totals: Mutex<Totals>,
}

impl Aggregator {
    pub fn open(rankings: Rankings) -> Self {
        Aggregator {
            rankings,
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Folds `measurement` into the running totals. Safe to call from many
    /// threads at once.
    ///
    /// # Panics
    ///
    /// Panics if a measurement for the same corpus position was already
    /// reported. That means a post was counted twice and every derived
    /// figure would be wrong.
    pub fn report(&self, measurement: Measurement) {
        self.totals.lock().fold(measurement);
    }

    /// Closes the sink and computes the derived statistics. Only call this
    /// after every build task has reported.
    pub fn close(self) -> AggregateStats {
        self.totals.into_inner().summarize(self.rankings)
    }
}

// A word or tag count plus the position where it was first seen, as
// (corpus order, position within the post).
#[derive(Debug)]
struct Tally {
    count: u64,
    first_seen: (usize, usize),
}

#[derive(Debug, Default)]
struct Totals {
    seen: FxHashSet<usize>,
    posts: u64,
    chars: u64,
    words: u64,
    tags: u64,
    read_seconds: u64,
    word_counts: FxHashMap<String, Tally>,
    tag_counts: FxHashMap<String, Tally>,
    years: BTreeMap<i32, u64>,
    months: BTreeMap<u32, u64>,
    days: BTreeMap<u32, u64>,
    hours: BTreeMap<u32, u64>,
}

impl Totals {
    fn fold(&mut self, m: Measurement) {
        if !self.seen.insert(m.order) {
            panic!("measurement for post #{} reported twice", m.order);
        }

        self.posts += 1;
        self.chars += m.chars;
        self.words += m.word_total();
        self.tags += m.tag_total();
        self.read_seconds += m.read_seconds;
        merge_counts(&mut self.word_counts, m.order, m.words);
        merge_counts(&mut self.tag_counts, m.order, m.tags);
        *self.years.entry(m.year).or_insert(0) += 1;
        *self.months.entry(m.month).or_insert(0) += 1;
        *self.days.entry(m.day).or_insert(0) += 1;
        *self.hours.entry(m.hour).or_insert(0) += 1;
    }

    fn summarize(self, rankings: Rankings) -> AggregateStats {
        let posts = self.posts;
        let avg_words = average(self.words, posts);
        let avg_chars = average(self.chars, posts);
        AggregateStats {
            posts,
            chars: self.chars,
            words: self.words,
            tags: self.tags,
            read_seconds: self.read_seconds,
            avg_chars,
            avg_words,
            avg_tags: average(self.tags, posts),
            avg_read_seconds: average(self.read_seconds, posts),
            avg_word_length: match avg_words > 0.0 {
                true => avg_chars / avg_words,
                false => 0.0,
            },
            top_words: top(self.word_counts, rankings.words),
            top_tags: top(self.tag_counts, rankings.tags),
            by_year: Histogram::new(self.years, posts),
            by_month: Histogram::new(self.months, posts),
            by_day: Histogram::new(self.days, posts),
            by_hour: Histogram::new(self.hours, posts),
        }
    }
}

fn merge_counts(into: &mut FxHashMap<String, Tally>, order: usize, counts: Vec<(String, u64)>) {
    for (position, (name, count)) in counts.into_iter().enumerate() {
        let first_seen = (order, position);
        let tally = into.entry(name).or_insert(Tally {
            count: 0,
            first_seen,
        });
        tally.count += count;
        tally.first_seen = tally.first_seen.min(first_seen);
    }
}

fn top(counts: FxHashMap<String, Tally>, n: usize) -> Vec<Ranked> {
    let mut ranked: Vec<(String, Tally)> = counts.into_iter().collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });
    ranked
        .into_iter()
        .take(n)
        .map(|(name, tally)| Ranked {
            name,
            count: tally.count,
        })
        .collect()
}

fn average(total: u64, count: u64) -> f64 {
    match count {
        0 => 0.0,
        _ => total as f64 / count as f64,
    }
}

/// The closed, read-only summary of a build.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateStats {
    pub posts: u64,
    pub chars: u64,
    pub words: u64,
    pub tags: u64,
    pub read_seconds: u64,
    pub avg_chars: f64,
    pub avg_words: f64,
    pub avg_tags: f64,
    pub avg_read_seconds: f64,

    /// Average characters per word (`avg_chars / avg_words`).
    pub avg_word_length: f64,
    pub top_words: Vec<Ranked>,
    pub top_tags: Vec<Ranked>,
    pub by_year: Histogram<i32>,
    pub by_month: Histogram<u32>,
    pub by_day: Histogram<u32>,
    pub by_hour: Histogram<u32>,
}

/// A word or tag and its corpus-wide count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub name: String,
    pub count: u64,
}

/// Post counts per temporal bucket, sorted by bucket key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram<K> {
    pub buckets: Vec<Bucket<K>>,

    /// Posts per distinct bucket that has at least one post. This is not
    /// normalized by calendar span: posts in three distinct months average
    /// over 3, not 12.
    pub average: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bucket<K> {
    pub key: K,
    pub count: u64,

    /// `count / total posts * 100`.
    pub percent: f64,
}

impl<K: Copy> Histogram<K> {
    fn new(counts: BTreeMap<K, u64>, posts: u64) -> Self {
        let per_bucket = average(counts.values().sum(), counts.len() as u64);
        Histogram {
            buckets: counts
                .into_iter()
                .map(|(key, count)| Bucket {
                    key,
                    count,
                    percent: average(count, posts) * 100.0,
                })
                .collect(),
            average: per_bucket,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::test::post_at;
    use proptest::prelude::*;

    fn measure(order: usize, post: &Post) -> Measurement {
        let text = PlainText::of_markdown(&post.content);
        let read_time = ReadTime::of(&text, 150);
        Measurement::new(order, post, &text, &read_time)
    }

    fn sample() -> Vec<Measurement> {
        let posts = [
            post_at("a", "Rust is fun. Rust is fast!", &["rust", "code"], "2023-05-01T10:00:00Z"),
            post_at("b", "Fun *fun* fun", &["life"], "2023-05-02T10:30:00Z"),
            post_at("c", "Is it? `fast`", &["code"], "2023-05-20T22:00:00Z"),
        ];
        posts.iter().enumerate().map(|(i, p)| measure(i, p)).collect()
    }

    const RANKINGS: Rankings = Rankings { words: 3, tags: 2 };

    fn aggregate(measurements: Vec<Measurement>) -> AggregateStats {
        let aggregator = Aggregator::open(RANKINGS);
        for m in measurements {
            aggregator.report(m);
        }
        aggregator.close()
    }

    #[test]
    fn test_measurement_counts_words_in_first_occurrence_order() {
        let post = post_at("a", "Rust is fun. Rust is fast!", &["rust"], "2023-05-01T10:00:00Z");
        let m = measure(0, &post);
        let words: Vec<(&str, u64)> = m.words.iter().map(|(w, n)| (w.as_str(), *n)).collect();
        assert_eq!(vec![("rust", 2), ("is", 2), ("fun", 1), ("fast", 1)], words);
        assert_eq!(6, m.word_total());
        assert_eq!(4 + 2 + 3 + 4 + 2 + 4, m.chars);
        assert_eq!((2023, 5, 1, 10), (m.year, m.month, m.day, m.hour));
    }

    #[test]
    fn test_totals_and_averages() {
        let stats = aggregate(sample());
        assert_eq!(3, stats.posts);
        // 6 + 3 + 3 words, 2 + 1 + 1 tags.
        assert_eq!(12, stats.words);
        assert_eq!(4, stats.tags);
        assert_eq!(4.0, stats.avg_words);
        assert_eq!(stats.avg_chars / stats.avg_words, stats.avg_word_length);
    }

    #[test]
    fn test_rankings_break_ties_by_first_occurrence() {
        let stats = aggregate(sample());
        // fun: 1 + 3 = 4; is: 2 + 1 = 3; rust: 2, fast: 2 (rust seen first).
        let words: Vec<(&str, u64)> =
            stats.top_words.iter().map(|r| (r.name.as_str(), r.count)).collect();
        assert_eq!(vec![("fun", 4), ("is", 3), ("rust", 2)], words);

        // code: 2; then rust and life tie at 1 and `code` was listed first in
        // post a, `rust` second.
        let tags: Vec<(&str, u64)> =
            stats.top_tags.iter().map(|r| (r.name.as_str(), r.count)).collect();
        assert_eq!(vec![("code", 2), ("rust", 1)], tags);
    }

    #[test]
    fn test_same_month_histogram() {
        let stats = aggregate(sample());
        assert_eq!(1, stats.by_month.buckets.len());
        assert_eq!(3, stats.by_month.buckets[0].count);
        assert_eq!(100.0, stats.by_month.buckets[0].percent);
        assert_eq!(3.0, stats.by_month.average);

        // days 1, 2 and 20: three buckets of one post.
        assert_eq!(3, stats.by_day.buckets.len());
        assert_eq!(1.0, stats.by_day.average);

        // hours 10, 10 and 22.
        let hours: Vec<(u32, u64)> = stats.by_hour.buckets.iter().map(|b| (b.key, b.count)).collect();
        assert_eq!(vec![(10, 2), (22, 1)], hours);
        assert_eq!(1.5, stats.by_hour.average);
    }

    #[test]
    fn test_empty_aggregate() {
        let stats = aggregate(Vec::new());
        assert_eq!(0, stats.posts);
        assert_eq!(0.0, stats.avg_words);
        assert_eq!(0.0, stats.avg_word_length);
        assert!(stats.top_words.is_empty());
        assert!(stats.by_year.buckets.is_empty());
        assert_eq!(0.0, stats.by_year.average);
    }

    #[test]
    #[should_panic(expected = "reported twice")]
    fn test_double_report_panics() {
        let aggregator = Aggregator::open(Rankings::default());
        let m = sample().remove(0);
        aggregator.report(m.clone());
        aggregator.report(m);
    }

    #[test]
    fn test_concurrent_reports() {
        let aggregator = Aggregator::open(RANKINGS);
        std::thread::scope(|scope| {
            for m in sample() {
                let aggregator = &aggregator;
                scope.spawn(move || aggregator.report(m));
            }
        });
        assert_eq!(aggregate(sample()), aggregator.close());
    }

    proptest! {
        #[test]
        fn prop_report_order_is_irrelevant(shuffled in Just(sample()).prop_shuffle()) {
            prop_assert_eq!(aggregate(sample()), aggregate(shuffled));
        }
    }
}
