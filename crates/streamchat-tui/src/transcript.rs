//! Lays the conversation out as pre-wrapped terminal lines.
//!
//! Wrapping happens here rather than in `Paragraph` so the view knows the
//! exact line count for auto-scroll and where every copy label lands.

use std::collections::HashMap;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use streamchat_core::markdown::{
    self, Alignment, Block, CodeBlock, CopyButton, Document, HighlightedSpan, Span as TextSpan,
};
use streamchat_core::{MessageId, Role, Session};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// A code block is identified by its message and its depth-first position
/// in that message's document.
pub type CopyKey = (MessageId, usize);

/// Clickable copy label: columns `start..end` of transcript line `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTarget {
    pub line: usize,
    pub start: u16,
    pub end: u16,
    pub key: CopyKey,
}

#[derive(Debug, Default)]
pub struct Transcript {
    pub lines: Vec<Line<'static>>,
    pub copy_targets: Vec<CopyTarget>,
}

impl Transcript {
    pub fn target_at(&self, line: usize, column: u16) -> Option<CopyKey> {
        self.copy_targets
            .iter()
            .find(|t| t.line == line && (t.start..t.end).contains(&column))
            .map(|t| t.key)
    }
}

/// Rendered markdown per message, redone only when the content grows.
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: HashMap<MessageId, (usize, Document)>,
}

impl DocumentCache {
    pub fn refresh(&mut self, session: &Session) {
        for message in session.messages() {
            let stale = self
                .entries
                .get(&message.id)
                .map_or(true, |(len, _)| *len != message.content.len());
            if stale {
                self.entries.insert(
                    message.id,
                    (message.content.len(), markdown::render(&message.content)),
                );
            }
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Document> {
        self.entries.get(&id).map(|(_, doc)| doc)
    }
}

/// Lay out every message of `session` for a view `width` columns wide.
pub fn build(
    session: &Session,
    documents: &DocumentCache,
    buttons: &HashMap<CopyKey, CopyButton>,
    width: usize,
) -> Transcript {
    let mut out = Output::default();

    for message in session.messages() {
        let color = match message.role {
            Role::User => Color::Cyan,
            Role::Assistant => Color::Yellow,
        };
        out.push(Line::from(Span::styled(
            format!("{}:", message.role.display_name()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));

        if let Some(doc) = documents.get(message.id) {
            let mut renderer = Renderer {
                id: message.id,
                next_code: 0,
                buttons,
            };
            let body = renderer.blocks(&doc.blocks, width, true);
            out.append(body);
        }
        out.blank();
    }

    Transcript {
        lines: out.lines,
        copy_targets: out.targets,
    }
}

#[derive(Default)]
struct Output {
    lines: Vec<Line<'static>>,
    targets: Vec<CopyTarget>,
}

impl Output {
    fn push(&mut self, line: Line<'static>) {
        self.lines.push(line);
    }

    fn blank(&mut self) {
        self.lines.push(Line::default());
    }

    fn append(&mut self, other: Output) {
        let offset = self.lines.len();
        self.targets.extend(other.targets.into_iter().map(|t| CopyTarget {
            line: t.line + offset,
            ..t
        }));
        self.lines.extend(other.lines);
    }

    /// Prefix `first` to line 0 and `rest` to every other line.
    fn indented(self, first: Span<'static>, rest: Span<'static>) -> Output {
        let first_width = first.width() as u16;
        let rest_width = rest.width() as u16;

        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| {
                let prefix = if i == 0 { first.clone() } else { rest.clone() };
                let mut spans = Vec::with_capacity(line.spans.len() + 1);
                spans.push(prefix);
                spans.extend(line.spans);
                Line::from(spans)
            })
            .collect();

        let targets = self
            .targets
            .into_iter()
            .map(|t| {
                let shift = if t.line == 0 { first_width } else { rest_width };
                CopyTarget {
                    start: t.start + shift,
                    end: t.end + shift,
                    ..t
                }
            })
            .collect();

        Output { lines, targets }
    }

    fn patched(mut self, style: Style) -> Output {
        for line in &mut self.lines {
            for span in &mut line.spans {
                span.style = span.style.patch(style);
            }
        }
        self
    }
}

struct Renderer<'a> {
    id: MessageId,
    next_code: usize,
    buttons: &'a HashMap<CopyKey, CopyButton>,
}

impl Renderer<'_> {
    fn blocks(&mut self, blocks: &[Block], width: usize, spaced: bool) -> Output {
        let mut out = Output::default();
        for (i, block) in blocks.iter().enumerate() {
            if spaced && i > 0 {
                out.blank();
            }
            let rendered = self.block(block, width);
            out.append(rendered);
        }
        out
    }

    fn block(&mut self, block: &Block, width: usize) -> Output {
        match block {
            Block::Heading { level, spans } => {
                let base = Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD);
                let mut styled = vec![Span::styled(
                    format!("{} ", "#".repeat(usize::from(*level))),
                    base,
                )];
                styled.extend(spans.iter().map(|s| inline(s, base)));
                wrap(styled, width)
            }
            Block::Paragraph(spans) => wrap(
                spans.iter().map(|s| inline(s, Style::default())).collect(),
                width,
            ),
            Block::BlockQuote(inner) => {
                let bar = Span::styled("│ ", Style::default().fg(Color::DarkGray));
                self.blocks(inner, width.saturating_sub(2), true)
                    .patched(Style::default().add_modifier(Modifier::ITALIC))
                    .indented(bar.clone(), bar)
            }
            Block::List {
                ordered,
                start,
                items,
            } => {
                let mut out = Output::default();
                for (i, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}. ", start + i as u64)
                    } else {
                        "• ".to_string()
                    };
                    let marker_width = marker.width();

                    let mut body = self.blocks(item, width.saturating_sub(marker_width), false);
                    if body.lines.is_empty() {
                        body.blank();
                    }
                    out.append(body.indented(
                        Span::styled(marker, Style::default().fg(Color::Yellow)),
                        Span::raw(" ".repeat(marker_width)),
                    ));
                }
                out
            }
            Block::Table {
                alignments,
                header,
                rows,
            } => table(alignments, header, rows),
            Block::CodeBlock(code) => self.code_block(code, width),
            Block::Rule => {
                let mut out = Output::default();
                out.push(Line::from(Span::styled(
                    "─".repeat(width.max(1)),
                    Style::default().fg(Color::DarkGray),
                )));
                out
            }
        }
    }

    fn code_block(&mut self, code: &CodeBlock, width: usize) -> Output {
        let key = (self.id, self.next_code);
        self.next_code += 1;

        let button = self.buttons.get(&key).copied().unwrap_or_default();
        let border = Style::default().fg(Color::DarkGray);

        let head = Span::styled(
            format!("┌─ {} ", code.language.as_deref().unwrap_or("text")),
            border,
        );
        let label = Span::styled(
            format!("[{}]", button.label()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        );
        let start = head.width() as u16;
        let end = start + label.width() as u16;

        let mut out = Output::default();
        out.push(Line::from(vec![head, label]));
        out.targets.push(CopyTarget {
            line: 0,
            start,
            end,
            key,
        });

        let gutter = Span::styled("│ ", border);
        for line in &code.lines {
            let spans = line.iter().map(highlighted).collect();
            out.append(wrap(spans, width.saturating_sub(2)).indented(gutter.clone(), gutter.clone()));
        }
        out.push(Line::from(Span::styled("└─", border)));
        out
    }
}

fn inline(span: &TextSpan, base: Style) -> Span<'static> {
    let mut style = base;
    if span.style.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if span.style.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if span.style.strikethrough {
        style = style.add_modifier(Modifier::CROSSED_OUT);
    }
    if span.style.code {
        style = style.fg(Color::LightMagenta);
    }
    if span.style.link {
        style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
    }
    Span::styled(span.text.clone(), style)
}

fn highlighted(span: &HighlightedSpan) -> Span<'static> {
    let mut style = match span.color {
        Some(rgb) => Style::default().fg(Color::Rgb(rgb.0, rgb.1, rgb.2)),
        None => Style::default().fg(Color::Gray),
    };
    if span.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if span.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    Span::styled(span.text.clone(), style)
}

/// Hard-wrap `spans` at `width` terminal columns, breaking at `\n` as well.
/// A wide character that would straddle the edge moves to the next line.
/// Always yields at least one line.
fn wrap(spans: Vec<Span<'static>>, width: usize) -> Output {
    let width = width.max(1);
    let mut out = Output::default();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut used = 0;

    for span in spans {
        let style = span.style;
        let mut buf = String::new();
        for ch in span.content.chars() {
            let cells = if ch == '\n' { 0 } else { ch.width().unwrap_or(0) };
            if ch == '\n' || (used > 0 && used + cells > width) {
                if !buf.is_empty() {
                    current.push(Span::styled(std::mem::take(&mut buf), style));
                }
                out.push(Line::from(std::mem::take(&mut current)));
                used = 0;
                if ch == '\n' {
                    continue;
                }
            }
            buf.push(ch);
            used += cells;
        }
        if !buf.is_empty() {
            current.push(Span::styled(buf, style));
        }
    }
    out.push(Line::from(current));
    out
}

fn table(alignments: &[Alignment], header: &[Vec<TextSpan>], rows: &[Vec<Vec<TextSpan>>]) -> Output {
    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);

    let mut widths = vec![0usize; columns];
    for row in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell_text(cell).width());
        }
    }

    let separator = Style::default().fg(Color::DarkGray);
    let mut out = Output::default();
    out.push(table_row(
        header,
        &widths,
        alignments,
        Style::default().add_modifier(Modifier::BOLD),
    ));
    out.push(Line::from(Span::styled(
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
        separator,
    )));
    for row in rows {
        out.push(table_row(row, &widths, alignments, Style::default()));
    }
    out
}

fn table_row(
    cells: &[Vec<TextSpan>],
    widths: &[usize],
    alignments: &[Alignment],
    style: Style,
) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
        }
        let text = cells.get(i).map(|c| cell_text(c)).unwrap_or_default();
        let pad = width.saturating_sub(text.width());
        let (left, right) = match alignments.get(i).copied().unwrap_or_default() {
            Alignment::Right => (pad, 0),
            Alignment::Center => (pad / 2, pad - pad / 2),
            Alignment::Left | Alignment::None => (0, pad),
        };
        spans.push(Span::styled(
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(right)),
            style,
        ));
    }
    Line::from(spans)
}

fn cell_text(cell: &[TextSpan]) -> String {
    cell.iter().map(|s| s.text.as_str()).collect()
}
