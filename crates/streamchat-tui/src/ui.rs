use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
    },
    Frame,
};

use unicode_width::UnicodeWidthChar;

use crate::app::{App, SPINNER};

const MAX_INPUT_ROWS: u16 = 8;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let input_rows = u16::try_from(app.controller.input().split('\n').count())
        .unwrap_or(MAX_INPUT_ROWS)
        .clamp(1, MAX_INPUT_ROWS);

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_rows + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_settings {
        render_settings(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let header = Line::from(vec![
        Span::styled(
            " streamchat ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {} ", app.mode.display_name()),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(app.target.clone(), Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let inner = block.inner(area);
    app.chat_area = Some(inner);
    app.layout_chat(inner.width, inner.height);

    let text = if app.controller.session().is_empty() {
        Text::from(Span::styled(
            "Ask anything. Ctrl+S sets your key.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(app.transcript.lines.clone())
    };

    let chat = Paragraph::new(text).block(block).scroll((app.scroll, 0));
    frame.render_widget(chat, area);

    let total = app.transcript.lines.len();
    if total > usize::from(inner.height) {
        let mut state = ScrollbarState::new(total.saturating_sub(usize::from(inner.height)))
            .position(usize::from(app.scroll));
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut state,
        );
    }
}

/// (row, terminal column) of char index `cursor` in a multi-line `input`.
fn cursor_position(input: &str, cursor: usize) -> (usize, usize) {
    let mut row = 0;
    let mut col = 0;
    for ch in input.chars().take(cursor) {
        if ch == '\n' {
            row += 1;
            col = 0;
        } else {
            col += ch.width().unwrap_or(0);
        }
    }
    (row, col)
}

/// The part of `line` visible in columns `offset..offset + width`. Wide
/// characters cut by either edge are left out.
fn visible_columns(line: &str, offset: usize, width: usize) -> String {
    let mut out = String::new();
    let mut col = 0;
    for ch in line.chars() {
        let cells = ch.width().unwrap_or(0);
        if col >= offset && col + cells <= offset + width {
            out.push(ch);
        }
        col += cells;
        if col >= offset + width {
            break;
        }
    }
    out
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.show_settings {
        Color::DarkGray
    } else {
        Color::Yellow
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    let inner = block.inner(area);
    let height = usize::from(inner.height.max(1));
    let width = usize::from(inner.width.max(1));

    let input = app.controller.input();
    let (row, col) = cursor_position(input, app.cursor);

    // Scroll so the cursor stays visible
    let offset_y = (row + 1).saturating_sub(height);
    let offset_x = (col + 1).saturating_sub(width);

    let paragraph = if input.is_empty() {
        Paragraph::new("Enter a message").style(Style::default().fg(Color::DarkGray))
    } else {
        let lines: Vec<Line> = input
            .split('\n')
            .skip(offset_y)
            .take(height)
            .map(|line| Line::from(visible_columns(line, offset_x, width)))
            .collect();
        Paragraph::new(lines).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(paragraph.block(block), area);

    if !app.show_settings {
        let x = u16::try_from(col - offset_x).unwrap_or(0);
        let y = u16::try_from(row - offset_y).unwrap_or(0);
        frame.set_cursor_position((inner.x + x, inner.y + y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let indicator = if app.controller.is_authorizing() {
        Span::styled(
            format!(" {} Checking key ", SPINNER[app.animation_frame]),
            Style::default().fg(Color::Yellow),
        )
    } else if app.controller.is_in_flight() {
        Span::styled(
            format!(" {} Waiting for reply ", SPINNER[app.animation_frame]),
            Style::default().fg(Color::Yellow),
        )
    } else if app.controller.can_submit() {
        Span::styled(
            " ▲ Send ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(" ▲ Send ", Style::default().fg(Color::DarkGray))
    };

    let hints = Span::styled(
        "  Ctrl+Enter send · Enter newline · Ctrl+S settings · PgUp/PgDn scroll · Esc quit",
        Style::default().fg(Color::DarkGray),
    );

    frame.render_widget(Paragraph::new(Line::from(vec![indicator, hints])), area);
}

fn render_settings(app: &App, frame: &mut Frame, area: Rect) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" {} ", app.mode.credential_label()));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your key below. Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(mask(&app.settings_input)).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.settings_cursor.min(usize::from(input_area.width)) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let status = Paragraph::new(format!("{} characters", app.settings_input.chars().count()))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}

/// Mask a secret, keeping the last four characters when it is long enough.
fn mask(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let masked_len = len - 4;
        let last_four: String = secret.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    }
}
