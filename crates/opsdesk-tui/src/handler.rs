use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{char_to_byte_index, App, EditTarget, FocusPane, InputMode, Screen};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick();
            app.poll_reply().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('1') => {
            app.screen = Screen::Chat;
            return;
        }
        KeyCode::Char('2') => {
            app.screen = Screen::Components;
            if app.records_state.selected().is_none() && !app.registry.is_empty() {
                app.records_state.select(Some(0));
            }
            return;
        }
        _ => {}
    }

    match app.screen {
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Components => handle_components_normal(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => {
            app.edit_target = EditTarget::Chat;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        _ => {}
    }
}

fn handle_components_normal(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Tab {
        app.focus = match app.focus {
            FocusPane::Records => FocusPane::Component,
            FocusPane::Component => FocusPane::Records,
        };
        return;
    }

    match app.focus {
        FocusPane::Records => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.records_down(),
            KeyCode::Char('k') | KeyCode::Up => app.records_up(),
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => app.open_selected_record(),
            KeyCode::Char('d') | KeyCode::Delete => app.delete_selected_record(),
            KeyCode::Char('D') => app.clear_records(),
            _ => {}
        },
        FocusPane::Component => {
            let Some(view) = app.view.as_mut() else {
                return;
            };
            match key.code {
                KeyCode::Char('j') | KeyCode::Down => view.select_next(),
                KeyCode::Char('k') | KeyCode::Up => view.select_prev(),
                KeyCode::PageDown => view.scroll = view.scroll.saturating_add(5),
                KeyCode::PageUp => view.scroll = view.scroll.saturating_sub(5),
                KeyCode::Char('r') => view.rerender(),
                KeyCode::Enter => app.activate_control(),
                KeyCode::Char('h') | KeyCode::Left => app.focus = FocusPane::Records,
                _ => {}
            }
        }
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => match app.edit_target {
            EditTarget::Chat => app.input_mode = InputMode::Normal,
            EditTarget::Field { .. } => app.cancel_field(),
        },
        KeyCode::Enter => match app.edit_target {
            EditTarget::Chat => app.submit_input(),
            EditTarget::Field { .. } => app.commit_field(),
        },
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}
