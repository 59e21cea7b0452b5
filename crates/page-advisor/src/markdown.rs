//! Markdown walking for audit descriptions.
//!
//! Audit descriptions are short CommonMark fragments such as
//! `"Large images slow pages. [Learn more](https://developer.chrome.com/docs/...)."`.
//! The walker reads the event stream once and reports links and paragraphs to a visitor; it
//! never rewrites the events, so anything else rendering the same markdown is unaffected.

use pulldown_cmark::{Event, Parser, Tag};

/// A link found in markdown, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub href: String,
    /// Link title attribute, empty when absent.
    pub title: String,
    /// Visible link text.
    pub text: String,
}

/// Plain text and links pulled out of a markdown fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMarkdown {
    /// Paragraph texts, each followed by a newline.
    pub text_content: String,
    pub links: Vec<ExtractedLink>,
}

/// Hooks invoked while walking markdown. Both default to doing nothing.
pub trait MarkdownVisitor {
    fn link(&mut self, _link: ExtractedLink) {}
    fn paragraph(&mut self, _text: &str) {}
}

impl MarkdownVisitor for ExtractedMarkdown {
    fn link(&mut self, link: ExtractedLink) {
        self.links.push(link);
    }

    fn paragraph(&mut self, text: &str) {
        self.text_content.push_str(text);
        self.text_content.push('\n');
    }
}

struct OpenLink {
    href: String,
    title: String,
    text: String,
}

/// Walk `markdown`, calling `visitor` for each link and each paragraph.
///
/// Links are reported when they close, so a link's text is complete. Nested inline markup
/// contributes its plain text only.
pub fn walk<V: MarkdownVisitor>(markdown: &str, visitor: &mut V) {
    let mut paragraph: Option<String> = None;
    let mut links: Vec<OpenLink> = Vec::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Paragraph) => paragraph = Some(String::new()),
            Event::End(Tag::Paragraph) => {
                if let Some(text) = paragraph.take() {
                    visitor.paragraph(&text);
                }
            }
            Event::Start(Tag::Link(_, dest, title)) => links.push(OpenLink {
                href: dest.to_string(),
                title: title.to_string(),
                text: String::new(),
            }),
            Event::End(Tag::Link(..)) => {
                if let Some(open) = links.pop() {
                    if let Some(outer) = links.last_mut() {
                        outer.text.push_str(&open.text);
                    }
                    visitor.link(ExtractedLink {
                        href: open.href,
                        title: open.title,
                        text: open.text,
                    });
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(p) = paragraph.as_mut() {
                    p.push_str(&text);
                }
                if let Some(open) = links.last_mut() {
                    open.text.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(p) = paragraph.as_mut() {
                    p.push('\n');
                }
                if let Some(open) = links.last_mut() {
                    open.text.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Extract paragraph text and links from a markdown fragment.
pub fn extract_text_and_links(markdown: &str) -> ExtractedMarkdown {
    let mut extracted = ExtractedMarkdown::default();
    walk(markdown, &mut extracted);
    extracted
}
