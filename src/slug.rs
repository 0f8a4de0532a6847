//! Defines [`slugify`], which reduces free text to a URL-safe identifier, and
//! [`SlugSet`], a namespace of claimed slugs that hands out collision-free
//! variants of a base slug. Post slugs and heading anchors live in separate
//! namespaces: the corpus owns one [`SlugSet`] for post slugs and every render
//! call starts a fresh one for anchor ids.

use deunicode::deunicode;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Returned by [`slugify`] when nothing survives the filtering steps.
pub const FALLBACK: &str = "post";

/// Word and character limit used for heading anchors and cross references.
pub const ANCHOR_LIMIT: usize = 768;

/// A set of words that are dropped from slugs. Entries are stored in the same
/// normalized form [`slugify`] produces for tokens (transliterated and
/// lowercased), so matching is case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct Stopwords(FxHashSet<String>);

impl Stopwords {
    /// Builds a stopword set from raw configuration entries.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Stopwords(
            words
                .into_iter()
                .map(|w| deunicode(w.as_ref().trim()).to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reduces `text` to a slug:
///
/// 1. transliterate to ASCII and lowercase
/// 2. drop ASCII punctuation (including `-` and `_`) and control characters
/// 3. split on whitespace
/// 4. drop tokens found in `stopwords`
/// 5. keep at most `max_words` tokens
/// 6. join with `-`
/// 7. truncate to `max_chars` characters
/// 8. trim leading and trailing `-`
///
/// Returns [`FALLBACK`] if the result is empty. The output only ever contains
/// lowercase ASCII alphanumerics and `-`.
pub fn slugify(
    text: &str,
    stopwords: &Stopwords,
    max_words: usize,
    max_chars: usize,
) -> String {
    let cleaned: String = deunicode(text)
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            c if c.is_ascii_whitespace() => Some(' '),
            _ => None,
        })
        .collect();

    let mut slug = cleaned
        .split_whitespace()
        .filter(|token| !stopwords.contains(token))
        .take(max_words)
        .collect::<Vec<&str>>()
        .join("-");

    // `slug` is pure ASCII at this point, so any byte index is a char boundary.
    slug.truncate(max_chars);

    match slug.trim_matches('-') {
        "" => FALLBACK.to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

/// A namespace of slugs. Claiming a slug that is already present yields a
/// variant with a numeric `-N` suffix; the base slug itself is never run
/// through [`slugify`] again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlugSet(FxHashSet<String>);

impl SlugSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.0.contains(slug)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Claims `base` or a suffixed variant using the post-slug rule: the first
    /// suffix tried is the number of entries already starting with `base`. Two
    /// posts reducing to `trip` therefore become `trip` and `trip-1`.
    pub fn claim_counted(&mut self, base: String) -> Result<String> {
        let first = self.0.iter().filter(|s| s.starts_with(&base)).count();
        self.claim(base, first)
    }

    /// Claims `base` or the first free variant among `base-1`, `base-2`, …
    /// This is the rule for heading anchors within one document.
    pub fn claim_sequential(&mut self, base: String) -> Result<String> {
        self.claim(base, 1)
    }

    fn claim(&mut self, base: String, first: usize) -> Result<String> {
        if self.0.insert(base.clone()) {
            return Ok(base);
        }

        // `attempts` distinct candidates cannot all be among `len` entries.
        let attempts = self.0.len() + 1;
        let found = (first..first + attempts)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.0.contains(candidate));
        match found {
            Some(candidate) => {
                self.0.insert(candidate.clone());
                Ok(candidate)
            }
            None => Err(Error::Exhausted { base, attempts }),
        }
    }
}

impl FromIterator<String> for SlugSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        SlugSet(iter.into_iter().collect())
    }
}

/// The result of a fallible slug-claiming operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to find a free slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Returned when no free suffixed variant was found within the bound.
    #[error("no free slug for `{base}` after {attempts} attempts")]
    Exhausted { base: String, attempts: usize },
}
