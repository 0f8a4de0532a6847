//! Converts post markdown to HTML. Parsing is delegated to [`pulldown_cmark`];
//! this module only rewrites the source before parsing and the event stream
//! between the parser and the HTML writer. The rewriting is done by a fixed,
//! ordered list of [`Extension`]s chosen when the [`Renderer`] is constructed:
//!
//! 1. [`CrossReferences`] turns `<#:Some Heading>` markers into links to the
//!    anchor of that heading.
//! 2. [`HeadingAnchors`] gives every heading a collision-free `id`, a
//!    self-link, and demotes `h1` to `h2` (the page template owns the `h1`).
//!
//! Rendering never fails. Anything the parser doesn't recognize is emitted as
//! literal text, so one malformed post can't prevent the rest of the corpus
//! from building.

use crate::slug::{slugify, SlugSet, Stopwords, ANCHOR_LIMIT};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use regex::Regex;
use std::borrow::Cow;
use std::ops::Range;
use tracing::{debug, warn};

/// Matches a cross-reference marker such as `<#:Getting started>`.
static CROSS_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#:([^>\n]+)>").expect("cross-reference pattern is valid"));

/// Matches the stand-in a marker is replaced with before parsing. The
/// delimiters are private-use characters, which markdown gives no meaning.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("placeholder pattern is valid"));

/// The `markdown-plugins` entries with no pulldown-cmark counterpart. They are
/// accepted and ignored.
const UNSUPPORTED_PLUGINS: &[&str] = &[
    "speedup",
    "insert",
    "superscript",
    "subscript",
    "abbr",
    "def_list",
    "mark",
    "math",
    "ruby",
    "spoiler",
    "url",
];

/// The `markdown-plugins` used when none are configured.
pub const DEFAULT_PLUGINS: &[&str] = &[
    "speedup",
    "strikethrough",
    "insert",
    "superscript",
    "subscript",
    "footnotes",
    "abbr",
];

/// Maps `markdown-plugins` names onto parser options. Unknown names are
/// logged and skipped.
pub fn plugin_options<S: AsRef<str>>(plugins: &[S]) -> Options {
    let mut options = Options::empty();
    for plugin in plugins {
        match plugin.as_ref() {
            "strikethrough" => options.insert(Options::ENABLE_STRIKETHROUGH),
            "footnotes" => options.insert(Options::ENABLE_FOOTNOTES),
            "table" => options.insert(Options::ENABLE_TABLES),
            "task_lists" => options.insert(Options::ENABLE_TASKLISTS),
            "smart_punctuation" => options.insert(Options::ENABLE_SMART_PUNCTUATION),
            name if UNSUPPORTED_PLUGINS.contains(&name) => {
                debug!(plugin = name, "markdown plugin has no effect")
            }
            name => warn!(plugin = name, "unknown markdown plugin"),
        }
    }
    options
}

// The options `DEFAULT_PLUGINS` map to.
fn default_options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_FOOTNOTES
}

/// The HTML for one post along with the anchor ids claimed while rendering it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPost {
    pub html: String,
    pub anchor_ids: SlugSet,
}

/// State shared by the extensions during a single [`Renderer::render`] call.
/// A fresh context is created for every call, so anchor ids never leak from
/// one document into another.
#[derive(Debug)]
pub struct Context {
    options: Options,
    anchors: SlugSet,

    // Marker labels, indexed by placeholder number.
    cross_references: Vec<String>,
}

/// A rewrite of the markdown source and of its event stream.
pub trait Extension: Send + Sync {
    /// Rewrites the source before it is parsed.
    fn preprocess<'s>(&self, source: Cow<'s, str>, _cx: &mut Context) -> Cow<'s, str> {
        source
    }

    fn transform<'a>(&self, events: Vec<Event<'a>>, cx: &mut Context) -> Vec<Event<'a>>;
}

/// Renders markdown with a fixed chain of [`Extension`]s. A [`Renderer`] holds
/// no per-document state and can be shared between threads.
pub struct Renderer {
    options: Options,
    extensions: Vec<Box<dyn Extension>>,
}

impl Renderer {
    /// Constructs a renderer with the default extensions: [`CrossReferences`]
    /// followed by [`HeadingAnchors`]. Cross references run first so that the
    /// links they produce inside headings are rendered as part of the heading.
    pub fn new() -> Self {
        Self::with_extensions(vec![Box::new(CrossReferences), Box::new(HeadingAnchors)])
    }

    /// Constructs a renderer that applies `extensions` in order.
    pub fn with_extensions(extensions: Vec<Box<dyn Extension>>) -> Self {
        Renderer {
            options: default_options(),
            extensions,
        }
    }

    /// Replaces the parser options, e.g. with [`plugin_options`].
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Converts `markdown` to HTML.
    pub fn render(&self, markdown: &str) -> RenderedPost {
        let mut cx = Context {
            options: self.options,
            anchors: SlugSet::new(),
            cross_references: Vec::new(),
        };
        let source = self
            .extensions
            .iter()
            .fold(Cow::Borrowed(markdown), |source, extension| {
                extension.preprocess(source, &mut cx)
            });

        let events: Vec<Event> = Parser::new_ext(&source, self.options).collect();
        let events = self
            .extensions
            .iter()
            .fold(events, |events, extension| extension.transform(events, &mut cx));

        let mut html = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut html, events.into_iter());
        RenderedPost {
            html,
            anchor_ids: cx.anchors,
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// The slug of an anchor id, before any collision suffix.
pub fn anchor_slug(text: &str) -> String {
    slugify(text, &Stopwords::default(), ANCHOR_LIMIT, ANCHOR_LIMIT)
}

/// Rewrites `<#:TEXT>` into a link to `#anchor_slug(TEXT)` whose visible text
/// is `# TEXT`, with `TEXT` taken verbatim from the source.
///
/// Markers take priority over any inline syntax that starts inside them, so
/// `<#:Hello *world*>` is one link. A marker that starts inside a code
/// span, a link, an image or inline HTML, or that touches a code block, is
/// left alone. Each accepted marker is swapped for a placeholder before
/// parsing and expanded back into link events afterwards.
pub struct CrossReferences;

impl Extension for CrossReferences {
    fn preprocess<'s>(&self, source: Cow<'s, str>, cx: &mut Context) -> Cow<'s, str> {
        let (spans, blocks) = opaque_ranges(&source, cx.options);

        let mut rewritten = String::new();
        let mut last = 0;
        for captures in CROSS_REFERENCE.captures_iter(&source) {
            let (Some(whole), Some(label)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let (start, end) = (whole.start(), whole.end());
            let escaped = source[..start].ends_with('\\');
            let in_span = spans.iter().any(|r| r.start < start && start < r.end);
            let in_block = blocks.iter().any(|r| r.start < end && start < r.end);
            if escaped || in_span || in_block {
                continue;
            }

            rewritten.push_str(&source[last..start]);
            rewritten.push_str(&format!("\u{E000}{}\u{E001}", cx.cross_references.len()));
            cx.cross_references.push(label.as_str().to_owned());
            last = end;
        }

        if last == 0 {
            return source;
        }
        rewritten.push_str(&source[last..]);
        Cow::Owned(rewritten)
    }

    fn transform<'a>(&self, events: Vec<Event<'a>>, cx: &mut Context) -> Vec<Event<'a>> {
        if cx.cross_references.is_empty() {
            return events;
        }
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            match event {
                Event::Text(text) if PLACEHOLDER.is_match(&text) => {
                    expand_placeholders(&text, &cx.cross_references, &mut out)
                }
                event => out.push(event),
            }
        }
        out
    }
}

// Source ranges a marker can't start inside (inline spans) or overlap (code
// blocks), as the parser sees them without any markers replaced.
fn opaque_ranges(source: &str, options: Options) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    let mut spans = Vec::new();
    let mut blocks = Vec::new();
    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(_)) => blocks.push(range),
            Event::Code(_)
            | Event::Html(_)
            | Event::Start(Tag::Link(..))
            | Event::Start(Tag::Image(..)) => spans.push(range),
            _ => {}
        }
    }
    (spans, blocks)
}

fn expand_placeholders<'a>(text: &str, labels: &[String], out: &mut Vec<Event<'a>>) {
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(number)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let Some(label) = number.as_str().parse::<usize>().ok().and_then(|n| labels.get(n)) else {
            continue;
        };
        if whole.start() > last {
            out.push(Event::Text(CowStr::from(text[last..whole.start()].to_owned())));
        }
        let href = CowStr::from(format!("#{}", anchor_slug(label)));
        out.push(Event::Start(Tag::Link(
            LinkType::Inline,
            href.clone(),
            CowStr::Borrowed(""),
        )));
        out.push(Event::Text(CowStr::from(format!("# {}", label))));
        out.push(Event::End(Tag::Link(LinkType::Inline, href, CowStr::Borrowed(""))));
        last = whole.end();
    }
    if last < text.len() {
        out.push(Event::Text(CowStr::from(text[last..].to_owned())));
    }
}

/// Replaces every heading with
/// `<hN id="ID"><a href="#ID">#</a> CONTENT</hN>`, where `N` is at least 2,
/// `ID` is claimed from the document's anchor namespace, and `CONTENT` is the
/// heading's own HTML, untouched.
pub struct HeadingAnchors;

impl Extension for HeadingAnchors {
    fn transform<'a>(&self, events: Vec<Event<'a>>, cx: &mut Context) -> Vec<Event<'a>> {
        let mut out = Vec::with_capacity(events.len());
        let mut events = events.into_iter();
        while let Some(event) = events.next() {
            match event {
                Event::Start(Tag::Heading(level)) => {
                    let inner: Vec<Event<'a>> = events
                        .by_ref()
                        .take_while(|e| !matches!(e, Event::End(Tag::Heading(_))))
                        .collect();
                    out.push(anchored_heading(level, inner, cx));
                }
                event => out.push(event),
            }
        }
        out
    }
}

fn anchored_heading<'a>(level: u32, inner: Vec<Event<'a>>, cx: &mut Context) -> Event<'a> {
    let level = level.max(2);
    let text = text_of(&inner);
    let mut content = String::new();
    html::push_html(&mut content, inner.into_iter());

    let heading = match cx.anchors.claim_sequential(anchor_slug(&text)) {
        Ok(id) => format!(
            "<h{0} id=\"{1}\"><a href=\"#{1}\">#</a> {2}</h{0}>\n",
            level, id, content
        ),
        Err(err) => {
            warn!(error = %err, heading = %text, "rendering heading without an anchor");
            format!("<h{0}>{1}</h{0}>\n", level, content)
        }
    };
    Event::Html(CowStr::from(heading))
}

// The visible text of a run of inline events.
fn text_of(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

/// The readable text of a markdown document, used for word counts and read
/// time. Block boundaries are turned into spaces so words from adjacent blocks
/// don't run together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlainText {
    pub text: String,
    pub images: usize,
}

impl PlainText {
    pub fn of_markdown(markdown: &str) -> Self {
        let mut plain = PlainText {
            text: String::with_capacity(markdown.len()),
            images: 0,
        };
        for event in Parser::new_ext(markdown, default_options()) {
            match event {
                Event::Text(t) | Event::Code(t) => plain.text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => plain.text.push(' '),
                Event::Start(Tag::Image(..)) => plain.images += 1,
                Event::End(
                    Tag::Paragraph
                    | Tag::Heading(_)
                    | Tag::BlockQuote
                    | Tag::CodeBlock(_)
                    | Tag::Item
                    | Tag::TableCell
                    | Tag::FootnoteDefinition(_),
                ) => plain.text.push(' '),
                _ => {}
            }
        }
        plain
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }
}

/// An estimate of how long a post takes to read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadTime {
    pub seconds: u64,

    /// Whole minutes, rounded up and never less than one (e.g., `3 min`).
    pub text: String,
}

impl ReadTime {
    /// Words take `60 / wpm` seconds each. Images take 12 seconds for the
    /// first, one second less for each one after it, but never less than 3.
    pub fn new(words: usize, images: usize, wpm: u64) -> Self {
        let reading = (words as u64).saturating_mul(60).div_ceil(wpm.max(1));
        let viewing = (0..images as u64)
            .map(|i| 12u64.saturating_sub(i).max(3))
            .fold(0u64, u64::saturating_add);
        let seconds = reading.saturating_add(viewing);
        let minutes = seconds.div_ceil(60).max(1);
        ReadTime {
            seconds,
            text: format!("{} min", minutes),
        }
    }

    pub fn of(plain: &PlainText, wpm: u64) -> Self {
        Self::new(plain.words().count(), plain.images, wpm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn render(markdown: &str) -> RenderedPost {
        Renderer::new().render(markdown)
    }

    #[test]
    fn test_cross_reference() {
        let rendered = render("See <#:Hello World>.");
        assert_eq!(
            "<p>See <a href=\"#hello-world\"># Hello World</a>.</p>\n",
            rendered.html
        );
    }

    #[test]
    fn test_cross_reference_ignored_in_code() {
        let rendered = render("`<#:inline>`\n\n```\n<#:block>\n```\n");
        assert!(rendered.html.contains("<code>&lt;#:inline&gt;</code>"));
        assert!(rendered.html.contains("&lt;#:block&gt;"));
        assert!(!rendered.html.contains("href"));
    }

    #[test]
    fn test_unterminated_cross_reference_is_literal() {
        let rendered = render("a <#:never closed\n\n[dangling](");
        assert!(rendered.html.contains("a &lt;#:never closed"));
        assert!(rendered.html.contains("[dangling]("));
    }

    #[test]
    fn test_cross_reference_wins_over_inline_syntax() {
        assert_eq!(
            "<p>See <a href=\"#hello-world\"># Hello *world*</a>.</p>\n",
            render("See <#:Hello *world*>.").html
        );
        assert_eq!(
            "<p>See <a href=\"#the-docshttpx-page\"># the [docs](http://x) page</a>.</p>\n",
            render("See <#:the [docs](http://x) page>.").html
        );
        assert_eq!(
            "<p>See <a href=\"#the-x-fn\"># the `x` fn</a>.</p>\n",
            render("See <#:the `x` fn>.").html
        );
    }

    #[test]
    fn test_cross_reference_label_is_verbatim() {
        let renderer = Renderer::new().with_options(plugin_options(&["smart_punctuation"]));
        let rendered = renderer.render("<#:Don't panic> and \"quotes\"");
        assert!(rendered
            .html
            .contains("<a href=\"#dont-panic\"># Don't panic</a>"));
        assert!(rendered.html.contains("\u{201c}quotes\u{201d}"));
    }

    #[test]
    fn test_cross_reference_inside_link_or_escaped_is_literal() {
        let rendered = render("[x](http://y \"<#:t>\") and \\<#:escaped>");
        assert!(!rendered.html.contains("href=\"#"));
        assert!(rendered.html.contains("&lt;#:escaped&gt;"));
    }

    #[test]
    fn test_plugin_options() {
        let options = plugin_options(&["footnotes", "table", "speedup", "nonsense"]);
        assert!(options.contains(Options::ENABLE_FOOTNOTES));
        assert!(options.contains(Options::ENABLE_TABLES));
        assert!(!options.contains(Options::ENABLE_STRIKETHROUGH));
        assert_eq!(default_options(), plugin_options(DEFAULT_PLUGINS));
    }

    #[test]
    fn test_heading_is_demoted_and_anchored() {
        let rendered = render("# Title\n\n### Deep");
        assert_eq!(
            "<h2 id=\"title\"><a href=\"#title\">#</a> Title</h2>\n\
             <h3 id=\"deep\"><a href=\"#deep\">#</a> Deep</h3>\n",
            rendered.html
        );
    }

    #[test]
    fn test_heading_content_is_preserved() {
        let rendered = render("## Hello *world*");
        assert!(rendered
            .html
            .contains("<a href=\"#hello-world\">#</a> Hello <em>world</em></h2>"));
    }

    #[test]
    fn test_duplicate_headings_get_distinct_ids() {
        let rendered = render("## Intro\n\n## Intro!\n\n## intro\n");
        assert!(rendered.html.contains("id=\"intro\""));
        assert!(rendered.html.contains("id=\"intro-1\""));
        assert!(rendered.html.contains("id=\"intro-2\""));
        assert_eq!(3, rendered.anchor_ids.len());
    }

    #[test]
    fn test_anchor_ids_are_per_document() {
        let renderer = Renderer::new();
        let first = renderer.render("## Intro");
        let second = renderer.render("## Intro");
        assert!(second.html.contains("id=\"intro\""));
        assert_eq!(first, second);
    }

    #[test]
    fn test_cross_reference_inside_heading() {
        let rendered = render("## Back to <#:Intro>");
        assert!(rendered.html.contains(
            "<h2 id=\"back-to-intro\"><a href=\"#back-to-intro\">#</a> Back to <a href=\"#intro\"># Intro</a></h2>"
        ));
    }

    #[test]
    fn test_custom_extension_chain() {
        let renderer = Renderer::with_extensions(Vec::new());
        assert_eq!("<h1>Title</h1>\n", renderer.render("# Title").html);
    }

    #[test]
    fn test_plain_text() {
        let plain = PlainText::of_markdown("# A\n\nb *c* `d`\n\n- e\n- f\n\n![img](x.png)");
        assert_eq!(
            vec!["A", "b", "c", "d", "e", "f", "img"],
            plain.words().collect::<Vec<_>>()
        );
        assert_eq!(1, plain.images);
    }

    #[test]
    fn test_read_time() {
        assert_eq!(ReadTime { seconds: 60, text: "1 min".to_owned() }, ReadTime::new(150, 0, 150));
        assert_eq!(ReadTime { seconds: 0, text: "1 min".to_owned() }, ReadTime::new(0, 0, 150));
        assert_eq!(ReadTime { seconds: 61, text: "2 min".to_owned() }, ReadTime::new(61, 0, 60));
        // 10 words at 150 wpm is 4s, plus 12s and 11s for two images.
        assert_eq!(27, ReadTime::new(10, 2, 150).seconds);
        // The image allowance bottoms out at 3s.
        assert_eq!(12 + 11 + 10 + 9 + 8 + 7 + 6 + 5 + 4 + 3 + 3, ReadTime::new(0, 11, 150).seconds);
        assert_eq!(ReadTime { seconds: 1, text: "1 min".to_owned() }, ReadTime::new(1, 0, u64::MAX));
        assert_eq!(u64::MAX, ReadTime::new(usize::MAX, 0, 1).seconds);
    }
}
