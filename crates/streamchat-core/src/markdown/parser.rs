use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use super::highlight::highlight_code;
use super::{Alignment, Block, CodeBlock, Document, Span, SpanStyle};

pub(crate) fn parse(markdown: &str) -> Document {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut builder = DocumentBuilder::default();
    for event in Parser::new_ext(markdown, options) {
        builder.process_event(event);
    }
    builder.finish()
}

/// Open container the next block belongs to
enum Frame {
    Quote(Vec<Block>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Item(Vec<Block>),
}

#[derive(Default)]
struct TableState {
    alignments: Vec<Alignment>,
    header: Vec<Vec<Span>>,
    rows: Vec<Vec<Vec<Span>>>,
    current_row: Vec<Vec<Span>>,
}

#[derive(Default)]
struct DocumentBuilder {
    blocks: Vec<Block>,
    frames: Vec<Frame>,
    spans: Vec<Span>,
    style_stack: Vec<SpanStyle>,
    heading_level: Option<u8>,
    code: Option<(Option<String>, String)>,
    table: Option<TableState>,
}

impl DocumentBuilder {
    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => self.push_styled(&code, |s| s.code = true),
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::Rule => {
                self.flush_paragraph();
                self.add_block(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " })
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                self.heading_level = Some(heading_level(level));
            }
            Tag::CodeBlock(kind) => {
                self.flush_paragraph();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(|lang| lang.to_string()),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::Emphasis => self.push_style(|s| s.italic = true),
            Tag::Strong => self.push_style(|s| s.bold = true),
            Tag::Strikethrough => self.push_style(|s| s.strikethrough = true),
            Tag::Link { .. } => self.push_style(|s| s.link = true),
            Tag::List(start) => {
                // Tight items carry their text without a paragraph.
                self.flush_paragraph();
                self.frames.push(Frame::List {
                    ordered: start.is_some(),
                    start: start.unwrap_or(1),
                    items: Vec::new(),
                });
            }
            Tag::Item => self.frames.push(Frame::Item(Vec::new())),
            Tag::BlockQuote(_) => {
                self.flush_paragraph();
                self.frames.push(Frame::Quote(Vec::new()));
            }
            Tag::Table(alignments) => {
                self.flush_paragraph();
                self.table = Some(TableState {
                    alignments: alignments.into_iter().map(Alignment::from).collect(),
                    ..Default::default()
                });
            }
            Tag::TableCell => self.spans.clear(),
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                let level = self.heading_level.take().unwrap_or(1);
                let spans = std::mem::take(&mut self.spans);
                self.add_block(Block::Heading { level, spans });
            }
            TagEnd::Paragraph => self.flush_paragraph(),
            TagEnd::CodeBlock => self.finish_code_block(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.style_stack.pop();
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
                if let Some(Frame::List {
                    ordered,
                    start,
                    items,
                }) = self.frames.pop()
                {
                    self.add_block(Block::List {
                        ordered,
                        start,
                        items,
                    });
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_paragraph();
                if let Some(Frame::Quote(blocks)) = self.frames.pop() {
                    self.add_block(Block::BlockQuote(blocks));
                }
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.spans);
                if let Some(table) = self.table.as_mut() {
                    table.current_row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.current_row);
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.current_row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.add_block(Block::Table {
                        alignments: table.alignments,
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            _ => {}
        }
    }

    fn current_style(&self) -> SpanStyle {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, apply: impl FnOnce(&mut SpanStyle)) {
        let mut style = self.current_style();
        apply(&mut style);
        self.style_stack.push(style);
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, code)) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        let style = self.current_style();
        self.push_span(text, style);
    }

    fn push_styled(&mut self, text: &str, apply: impl FnOnce(&mut SpanStyle)) {
        let mut style = self.current_style();
        apply(&mut style);
        self.push_span(text, style);
    }

    fn push_span(&mut self, text: &str, style: SpanStyle) {
        if text.is_empty() {
            return;
        }
        // Adjacent runs of the same style are merged.
        if let Some(last) = self.spans.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.spans.push(Span {
            text: text.to_string(),
            style,
        });
    }

    fn finish_code_block(&mut self) {
        let Some((language, mut code)) = self.code.take() else {
            return;
        };
        if code.ends_with('\n') {
            code.pop();
        }

        let lines = highlight_code(&code, language.as_deref());
        self.add_block(Block::CodeBlock(CodeBlock {
            language,
            code,
            lines,
        }));
    }

    fn flush_paragraph(&mut self) {
        if self.spans.is_empty() || self.table.is_some() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        self.add_block(Block::Paragraph(spans));
    }

    fn add_block(&mut self, block: Block) {
        match self.frames.last_mut() {
            Some(Frame::Quote(blocks)) | Some(Frame::Item(blocks)) => blocks.push(block),
            // Blocks never sit directly in a list; give them an item.
            Some(Frame::List { items, .. }) => items.push(vec![block]),
            None => self.blocks.push(block),
        }
    }

    fn finish(mut self) -> Document {
        self.flush_paragraph();

        // Close containers left open by truncated input.
        while let Some(frame) = self.frames.pop() {
            let block = match frame {
                Frame::Quote(blocks) => Block::BlockQuote(blocks),
                Frame::List {
                    ordered,
                    start,
                    items,
                } => Block::List {
                    ordered,
                    start,
                    items,
                },
                Frame::Item(blocks) => {
                    if let Some(Frame::List { items, .. }) = self.frames.last_mut() {
                        items.push(blocks);
                    }
                    continue;
                }
            };
            self.add_block(block);
        }

        Document {
            blocks: self.blocks,
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

impl From<pulldown_cmark::Alignment> for Alignment {
    fn from(alignment: pulldown_cmark::Alignment) -> Self {
        match alignment {
            pulldown_cmark::Alignment::None => Alignment::None,
            pulldown_cmark::Alignment::Left => Alignment::Left,
            pulldown_cmark::Alignment::Center => Alignment::Center,
            pulldown_cmark::Alignment::Right => Alignment::Right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bold(text: &str) -> Span {
        Span {
            text: text.to_string(),
            style: SpanStyle {
                bold: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_headings_keep_their_level() {
        let doc = parse("# One\n\n### Three\n");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    spans: vec![Span::plain("One")]
                },
                Block::Heading {
                    level: 3,
                    spans: vec![Span::plain("Three")]
                },
            ]
        );
    }

    #[test]
    fn test_inline_styles() {
        let doc = parse("plain **strong** and `code`\n");
        let Block::Paragraph(spans) = &doc.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(spans[0], Span::plain("plain "));
        assert_eq!(spans[1], bold("strong"));
        assert_eq!(spans[2], Span::plain(" and "));
        assert!(spans[3].style.code);
        assert_eq!(spans[3].text, "code");
    }

    #[test]
    fn test_soft_breaks_join_lines() {
        let doc = parse("first\nsecond\n");
        assert_eq!(doc.blocks, vec![Block::Paragraph(vec![Span::plain("first second")])]);
    }

    #[test]
    fn test_tight_and_ordered_lists() {
        let doc = parse("3. three\n4. four\n");
        assert_eq!(
            doc.blocks,
            vec![Block::List {
                ordered: true,
                start: 3,
                items: vec![
                    vec![Block::Paragraph(vec![Span::plain("three")])],
                    vec![Block::Paragraph(vec![Span::plain("four")])],
                ],
            }]
        );
    }

    #[test]
    fn test_nested_list_inside_item() {
        let doc = parse("- outer\n  - inner\n");
        let Block::List { items, .. } = &doc.blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0][0], Block::Paragraph(vec![Span::plain("outer")]));
        assert!(matches!(&items[0][1], Block::List { ordered: false, items, .. } if items.len() == 1));
    }

    #[test]
    fn test_block_quote_wraps_paragraph() {
        let doc = parse("> quoted *words*\n");
        let Block::BlockQuote(inner) = &doc.blocks[0] else {
            panic!("expected block quote");
        };
        let Block::Paragraph(spans) = &inner[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(spans[0], Span::plain("quoted "));
        assert!(spans[1].style.italic);
    }

    #[test]
    fn test_table_cells_and_alignment() {
        let doc = parse("| name | n |\n|:-----|--:|\n| a | 1 |\n| b | 2 |\n");
        assert_eq!(
            doc.blocks,
            vec![Block::Table {
                alignments: vec![Alignment::Left, Alignment::Right],
                header: vec![vec![Span::plain("name")], vec![Span::plain("n")]],
                rows: vec![
                    vec![vec![Span::plain("a")], vec![Span::plain("1")]],
                    vec![vec![Span::plain("b")], vec![Span::plain("2")]],
                ],
            }]
        );
    }

    #[test]
    fn test_fenced_code_takes_first_info_word() {
        let doc = parse("```rust ignore\nfn main() {}\n```\n");
        let Block::CodeBlock(code) = &doc.blocks[0] else {
            panic!("expected code block");
        };
        assert_eq!(code.language.as_deref(), Some("rust"));
        assert_eq!(code.code, "fn main() {}");
        assert_eq!(code.lines.len(), 1);
    }

    #[test]
    fn test_rule_and_task_markers() {
        let doc = parse("- [x] done\n\n---\n");
        let Block::List { items, .. } = &doc.blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(items[0][0], Block::Paragraph(vec![Span::plain("[x] done")]));
        assert_eq!(doc.blocks[1], Block::Rule);
    }
}
