use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Chat(event) => app.apply(event),
    }
}

fn is_submit(key: &KeyEvent) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => ctrl || key.modifiers.contains(KeyModifiers::ALT),
        // Ctrl+Enter arrives as Ctrl+J on terminals without key disambiguation
        KeyCode::Char('j') => ctrl,
        _ => false,
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if key.code == KeyCode::Char('c') && ctrl {
        app.should_quit = true;
        return;
    }

    if app.show_settings {
        handle_settings_key(app, key);
        return;
    }

    if is_submit(&key) {
        app.submit();
        return;
    }

    // The buffer is what gets sent once the credential check passes.
    let editable = !app.controller.is_authorizing();

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('s') if ctrl => app.open_settings(),

        KeyCode::PageUp => app.scroll_up(app.chat_height.saturating_sub(1).max(1)),
        KeyCode::PageDown => app.scroll_down(app.chat_height.saturating_sub(1).max(1)),
        KeyCode::Up if ctrl => app.scroll_up(1),
        KeyCode::Down if ctrl => app.scroll_down(1),

        KeyCode::Enter if editable => insert_char(app, '\n'),
        KeyCode::Char(c) if !ctrl && editable => insert_char(app, c),
        KeyCode::Backspace if editable => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let input = app.controller.input_mut();
                let byte_pos = char_to_byte_index(input, app.cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete if editable => {
            let input = app.controller.input_mut();
            if app.cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, app.cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.controller.input().chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.controller.input().chars().count();
        }
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let input = app.controller.input_mut();
    let byte_pos = char_to_byte_index(input, app.cursor);
    input.insert(byte_pos, c);
    app.cursor += 1;
}

fn handle_settings_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_settings(),
        KeyCode::Enter => app.save_settings(),
        KeyCode::Backspace => {
            if app.settings_cursor > 0 {
                app.settings_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.settings_input, app.settings_cursor);
                app.settings_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.settings_input, app.settings_cursor);
            app.settings_input.insert(byte_pos, c);
            app.settings_cursor += 1;
        }
        KeyCode::Left => {
            app.settings_cursor = app.settings_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.settings_input.chars().count();
            app.settings_cursor = (app.settings_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.settings_cursor = 0;
        }
        KeyCode::End => {
            app.settings_cursor = app.settings_input.chars().count();
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        MouseEventKind::Down(MouseButton::Left) => app.click(mouse.column, mouse.row),
        _ => {}
    }
}
