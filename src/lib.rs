//! The library code for the `scribe` blog generator. A blog is a single
//! `blog.json` project file ([`crate::config`]) holding the site settings and
//! an ordered corpus of posts ([`crate::post`]). Building the site is broken
//! down into two steps:
//!
//! 1. Building the posts ([`crate::build::build_all`]): one thread per post
//!    renders its markdown ([`crate::markdown`]), writes its page
//!    ([`crate::write`]) and reports a measurement into a shared aggregator
//!    ([`crate::stats`]).
//! 2. Once every post thread has been joined, writing the site-wide files from
//!    the corpus and the closed statistics: the index and stats pages, the RSS
//!    feed ([`crate::feed`]), the sitemap ([`crate::sitemap`]) and the small
//!    static files ([`crate::site`]).
//!
//! Slugs for posts and heading anchors both come from [`crate::slug`], but
//! from separate namespaces: post slugs are unique across the corpus, anchor
//! ids only within one rendered document.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod feed;
pub mod markdown;
pub mod post;
pub mod site;
pub mod sitemap;
pub mod slug;
pub mod stats;
pub mod util;
mod value;
pub mod write;
