//! Renders the Markdown the report generator produces.
//!
//! `pulldown-cmark` events are folded into a small block tree (headings,
//! paragraphs, lists, code blocks). The tree is then rendered either as terminal
//! text or as HTML with every text node escaped. Raw HTML in the input is kept as
//! literal text; tables and links render as their text content.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    Code(String),
    Break,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph { inlines: Vec<Inline> },
    /// `start` is the first number of an ordered list, `None` for bullets.
    List {
        start: Option<u64>,
        tight: bool,
        items: Vec<Vec<Block>>,
    },
    Code { text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

enum Frame {
    List {
        start: Option<u64>,
        tight: bool,
        items: Vec<Vec<Block>>,
    },
    Item(Vec<Block>),
}

#[derive(Default)]
struct Builder {
    root: Vec<Block>,
    frames: Vec<Frame>,
    inlines: Vec<Inline>,
    heading: Option<u8>,
    code: Option<String>,
    strong: usize,
    emphasis: usize,
}

impl Builder {
    fn sink(&mut self) -> &mut Vec<Block> {
        match self.frames.last_mut() {
            Some(Frame::Item(blocks)) => blocks,
            _ => &mut self.root,
        }
    }

    fn flush_paragraph(&mut self) {
        while matches!(self.inlines.last(), Some(Inline::Break)) {
            self.inlines.pop();
        }
        if self.inlines.is_empty() {
            return;
        }
        let inlines = std::mem::take(&mut self.inlines);
        self.sink().push(Block::Paragraph { inlines });
    }

    fn push_text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        let inline = if self.strong > 0 {
            Inline::Strong(text.to_string())
        } else if self.emphasis > 0 {
            Inline::Emphasis(text.to_string())
        } else {
            Inline::Text(text.to_string())
        };
        let merged = match (self.inlines.last_mut(), &inline) {
            (Some(Inline::Text(prev)), Inline::Text(next))
            | (Some(Inline::Strong(prev)), Inline::Strong(next))
            | (Some(Inline::Emphasis(prev)), Inline::Emphasis(next)) => {
                prev.push_str(next);
                true
            }
            _ => false,
        };
        if !merged {
            self.inlines.push(inline);
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush_paragraph(),
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                self.heading = Some(heading_level(level));
            }
            Tag::CodeBlock(_) => {
                self.flush_paragraph();
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush_paragraph();
                self.frames.push(Frame::List {
                    start,
                    tight: true,
                    items: Vec::new(),
                });
            }
            Tag::Item => self.frames.push(Frame::Item(Vec::new())),
            Tag::Strong => self.strong += 1,
            Tag::Emphasis => self.emphasis += 1,
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_paragraph();
                // A paragraph tag inside an item only appears in loose lists.
                let depth = self.frames.len();
                if depth >= 2 && matches!(self.frames.last(), Some(Frame::Item(_))) {
                    if let Frame::List { tight, .. } = &mut self.frames[depth - 2] {
                        *tight = false;
                    }
                }
            }
            TagEnd::Heading(_) => {
                let level = self.heading.take().unwrap_or(1);
                let inlines = std::mem::take(&mut self.inlines);
                self.sink().push(Block::Heading { level, inlines });
            }
            TagEnd::CodeBlock => {
                if let Some(text) = self.code.take() {
                    self.sink().push(Block::Code {
                        text: text.trim_end().to_string(),
                    });
                }
            }
            TagEnd::Item => {
                self.flush_paragraph();
                if let Some(Frame::Item(blocks)) = self.frames.pop() {
                    if let Some(Frame::List { items, .. }) = self.frames.last_mut() {
                        items.push(blocks);
                    }
                }
            }
            TagEnd::List(_) => {
                if let Some(Frame::List { start, tight, items }) = self.frames.pop() {
                    self.sink().push(Block::List { start, tight, items });
                }
            }
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::HtmlBlock => self.flush_paragraph(),
            _ => {}
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

pub fn parse(markdown: &str) -> Document {
    let mut builder = Builder::default();
    for event in Parser::new(markdown) {
        match event {
            Event::Start(tag) => builder.start(tag),
            Event::End(tag) => builder.end(tag),
            Event::Text(text) | Event::InlineHtml(text) => builder.push_text(&text),
            Event::Html(text) => {
                builder.push_text(text.trim_end_matches('\n'));
                builder.inlines.push(Inline::Break);
            }
            Event::Code(code) => builder.inlines.push(Inline::Code(code.to_string())),
            Event::SoftBreak | Event::HardBreak => builder.inlines.push(Inline::Break),
            _ => {}
        }
    }
    builder.flush_paragraph();
    Document { blocks: builder.root }
}

fn inline_text(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) | Inline::Strong(text) | Inline::Emphasis(text) | Inline::Code(text) => text.as_str(),
            Inline::Break => "\n",
        })
        .collect()
}

/// Plain terminal rendering: underlined headings, bullet and numbered lists.
pub fn render_text(document: &Document) -> String {
    render_blocks_text(&document.blocks)
}

fn render_blocks_text(blocks: &[Block]) -> String {
    let mut sections = Vec::new();
    for block in blocks {
        match block {
            Block::Heading { level, inlines } => {
                let text = inline_text(inlines);
                let underline = match level {
                    1 => '=',
                    2 => '-',
                    _ => '~',
                };
                let width = text.chars().count();
                sections.push(format!("{}\n{}", text, underline.to_string().repeat(width)));
            }
            Block::Paragraph { inlines } => sections.push(inline_text(inlines)),
            Block::Code { text } => sections.push(indent(text, "    ", "    ")),
            Block::List { start, tight, items } => {
                let separator = if *tight { "\n" } else { "\n\n" };
                let lines = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let marker = match start {
                            Some(first) => format!("{}. ", first + index as u64),
                            None => "• ".to_string(),
                        };
                        let body = item_text(item, *tight);
                        let rest = " ".repeat(2 + marker.chars().count());
                        indent(&body, &format!("  {}", marker), &rest)
                    })
                    .collect::<Vec<_>>();
                sections.push(lines.join(separator));
            }
        }
    }
    sections.join("\n\n")
}

fn item_text(blocks: &[Block], tight: bool) -> String {
    if tight {
        blocks
            .iter()
            .map(|block| render_blocks_text(std::slice::from_ref(block)))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        render_blocks_text(blocks)
    }
}

fn indent(text: &str, first: &str, rest: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(index, line)| {
            if line.is_empty() {
                String::new()
            } else if index == 0 {
                format!("{}{}", first, line)
            } else {
                format!("{}{}", rest, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_html(document: &Document) -> String {
    let mut out = String::new();
    render_blocks_html(&document.blocks, false, &mut out);
    out
}

fn render_blocks_html(blocks: &[Block], tight: bool, out: &mut String) {
    for block in blocks {
        match block {
            Block::Heading { level, inlines } => {
                out.push_str(&format!("<h{level}>{}</h{level}>\n", inlines_html(inlines)));
            }
            Block::Paragraph { inlines } if tight => out.push_str(&inlines_html(inlines)),
            Block::Paragraph { inlines } => {
                out.push_str(&format!("<p>{}</p>\n", inlines_html(inlines)));
            }
            Block::Code { text } => {
                out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(text)));
            }
            Block::List { start, tight, items } => {
                match start {
                    Some(1) => out.push_str("<ol>\n"),
                    Some(first) => out.push_str(&format!("<ol start=\"{}\">\n", first)),
                    None => out.push_str("<ul>\n"),
                }
                for item in items {
                    out.push_str("<li>");
                    for (index, block) in item.iter().enumerate() {
                        if index > 0 && *tight {
                            out.push('\n');
                        }
                        render_blocks_html(std::slice::from_ref(block), *tight, out);
                    }
                    out.push_str("</li>\n");
                }
                out.push_str(if start.is_some() { "</ol>\n" } else { "</ul>\n" });
            }
        }
    }
}

fn inlines_html(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) => escape_html(text),
            Inline::Strong(text) => format!("<strong>{}</strong>", escape_html(text)),
            Inline::Emphasis(text) => format!("<em>{}</em>", escape_html(text)),
            Inline::Code(text) => format!("<code>{}</code>", escape_html(text)),
            Inline::Break => "<br />\n".to_string(),
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    // Writing into a String is infallible.
    let _ = pulldown_cmark_escape::escape_html(&mut escaped, text);
    escaped
}
