//! Markdown rendering for chat messages.
//!
//! [`render`] is a pure function of the message text. It is re-run every
//! time a streamed message grows, so it must cope with partial input: an
//! unterminated code fence is closed before parsing so the half-written
//! block still renders as code.

use std::borrow::Cow;

mod copy;
mod highlight;
mod parser;

pub use copy::CopyButton;
pub use highlight::highlight_code;

const FENCE: &str = "```";

/// Rendered message: block-level elements in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// Every code block, depth-first in document order.
    pub fn code_blocks(&self) -> Vec<&CodeBlock> {
        fn walk<'a>(blocks: &'a [Block], out: &mut Vec<&'a CodeBlock>) {
            for block in blocks {
                match block {
                    Block::CodeBlock(code) => out.push(code),
                    Block::BlockQuote(inner) => walk(inner, out),
                    Block::List { items, .. } => {
                        for item in items {
                            walk(item, out);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.blocks, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph(Vec<Span>),
    BlockQuote(Vec<Block>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<Vec<Span>>,
        rows: Vec<Vec<Vec<Span>>>,
    },
    CodeBlock(CodeBlock),
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

/// Inline run of text with uniform style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link: bool,
}

/// Fenced or indented code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// First word of the fence info string, if any
    pub language: Option<String>,
    /// Literal text of the block, without the final newline
    pub code: String,
    /// `code` split into highlighted lines
    pub lines: Vec<Vec<HighlightedSpan>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedSpan {
    pub text: String,
    /// Foreground color; `None` when the language is not recognised
    pub color: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Render markdown `text` into a [`Document`].
pub fn render(text: &str) -> Document {
    parser::parse(&close_open_fence(text))
}

/// Append a closing fence when `text` has an odd number of ` ``` ` markers.
///
/// The fence is written under the same block quote and list nesting as the
/// line that opened it, so it closes that block instead of opening a new one
/// at the top level.
pub fn close_open_fence(text: &str) -> Cow<'_, str> {
    if text.matches(FENCE).count() % 2 == 0 {
        return Cow::Borrowed(text);
    }

    let prefix = open_fence_prefix(text);
    let mut closed = String::with_capacity(text.len() + prefix.len() + FENCE.len() + 1);
    closed.push_str(text);
    closed.push('\n');
    closed.push_str(&prefix);
    closed.push_str(FENCE);
    Cow::Owned(closed)
}

/// Container prefix for the closing fence: quote markers are repeated and
/// list markers become indentation. Anything else on the line before the
/// fence means it is not a container prefix, and the fence goes at column 0.
fn open_fence_prefix(text: &str) -> String {
    let Some(at) = text.rfind(FENCE) else {
        return String::new();
    };
    let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let lead = text[line_start..at].trim_end_matches('`');

    let is_container = lead
        .chars()
        .all(|c| matches!(c, ' ' | '\t' | '>' | '-' | '*' | '+' | '.' | ')') || c.is_ascii_digit());
    if !is_container {
        return String::new();
    }

    lead.chars()
        .map(|c| match c {
            '>' | '\t' => c,
            _ => ' ',
        })
        .collect()
}
