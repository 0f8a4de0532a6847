//! Support for creating the RSS feed from the corpus.

use crate::config::{Config, Error as ConfigError};
use crate::post::Corpus;
use chrono::{DateTime, Utc};
use rss::{Channel, ChannelBuilder, GuidBuilder, Item, ItemBuilder};
use std::io::Write;
use thiserror::Error;
use tracing::debug;

/// The date format used for `pubDate` and `lastBuildDate`.
const FEED_TIME: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Creates a feed for `corpus` and writes the result to a
/// [`std::io::Write`]. `now` becomes the channel's `lastBuildDate`.
pub fn write_feed<W: Write>(config: &Config, corpus: &Corpus, now: DateTime<Utc>, w: W) -> Result<()> {
    feed(config, corpus, now)?.write_to(w)?;
    Ok(())
}

/// Builds the RSS channel: one item per post, in corpus order.
pub fn feed(config: &Config, corpus: &Corpus, now: DateTime<Utc>) -> Result<Channel> {
    let items = corpus
        .iter()
        .map(|post| {
            let link = config.post_url(&post.slug)?.to_string();
            debug!(slug = %post.slug, "adding to feed");
            Ok(feed_item(
                &post.title,
                &post.description,
                link,
                &post.created,
            ))
        })
        .collect::<Result<Vec<Item>>>()?;

    Ok(ChannelBuilder::default()
        .title(&config.title)
        .link(&config.blog)
        .description(&config.description)
        .language(Some(config.locale.to_lowercase().replace('_', "-")))
        .last_build_date(Some(now.format(FEED_TIME).to_string()))
        .items(items)
        .build())
}

fn feed_item(title: &str, description: &str, link: String, created: &DateTime<Utc>) -> Item {
    ItemBuilder::default()
        .title(Some(title.to_owned()))
        .link(Some(link.clone()))
        .guid(Some(GuidBuilder::default().permalink(true).value(link).build()))
        .description(Some(description.to_owned()))
        .pub_date(Some(created.format(FEED_TIME).to_string()))
        .build()
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the feed can't be serialized or written.
    #[error("writing feed: {0}")]
    Rss(#[from] rss::Error),

    /// Returned when a post link can't be built from the configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::test::post_at;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_feed_items_follow_corpus() -> Result<()> {
        let config = Config::default();
        let corpus = Corpus::new(vec![
            post_at("newer", "x", &[], "2023-06-01T09:00:00Z"),
            post_at("older", "y", &[], "2023-05-01T10:00:00Z"),
        ]);
        let channel = feed(&config, &corpus, now())?;

        assert_eq!("blog", channel.title());
        assert_eq!(Some("en-gb"), channel.language());
        assert_eq!(Some("Tue, 02 Jan 2024 03:04:05 GMT"), channel.last_build_date());

        let items = channel.items();
        assert_eq!(2, items.len());
        assert_eq!(Some("NEWER"), items[0].title());
        assert_eq!(Some("https://blog.example.com/b/newer"), items[0].link());
        assert_eq!(
            Some("https://blog.example.com/b/newer"),
            items[0].guid().map(|g| g.value())
        );
        assert_eq!(Some("about newer"), items[0].description());
        assert_eq!(Some("Thu, 01 Jun 2023 09:00:00 GMT"), items[0].pub_date());
        Ok(())
    }

    #[test]
    fn test_write_feed_escapes_text() -> Result<()> {
        let config = Config::default();
        let mut post = post_at("a", "x", &[], "2023-06-01T09:00:00Z");
        post.title = "Fish & Chips".to_owned();
        let mut xml: Vec<u8> = Vec::new();
        write_feed(&config, &Corpus::new(vec![post]), now(), &mut xml)?;
        let xml = String::from_utf8_lossy(&xml);
        assert!(xml.contains("<rss version=\"2.0\""));
        assert!(xml.contains("<title>Fish &amp; Chips</title>"));
        Ok(())
    }
}
