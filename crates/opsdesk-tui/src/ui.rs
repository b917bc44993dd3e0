use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use crate::app::{App, ComponentView, EditTarget, FocusPane, InputMode, Screen};
use opsdesk_core::{ChatRole, UiNode};

/// Ensure the selected item in a list is visible by adjusting the ListState offset.
fn ensure_selected_visible(state: &mut ListState, visible_height: usize) {
    let visible_height = visible_height.max(1);

    if let Some(selected) = state.selected() {
        let min_offset = selected.saturating_sub(visible_height - 1);
        let new_offset = state.offset().clamp(min_offset, selected);
        if new_offset != state.offset() {
            *state.offset_mut() = new_offset;
        }
    }
}

/// `**bold**` and `` `code` `` spans in assistant text.
fn styled_line(text: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let next = [("**", Modifier::BOLD), ("`", Modifier::ITALIC)]
            .into_iter()
            .filter_map(|(marker, style)| rest.find(marker).map(|at| (at, marker, style)))
            .min_by_key(|(at, _, _)| *at);

        let Some((at, marker, modifier)) = next else {
            spans.push(Span::raw(rest.to_string()));
            break;
        };
        let after = &rest[at + marker.len()..];
        let Some(close) = after.find(marker) else {
            spans.push(Span::raw(rest.to_string()));
            break;
        };

        if at > 0 {
            spans.push(Span::raw(rest[..at].to_string()));
        }
        let inner = after[..close].to_string();
        let style = if marker == "`" {
            Style::default().fg(Color::Magenta).add_modifier(modifier)
        } else {
            Style::default().add_modifier(modifier)
        };
        spans.push(Span::styled(inner, style));
        rest = &after[close + marker.len()..];
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Components => render_components_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let count = app.registry.len();
    let saved = if count > 0 {
        format!(" [{} generated]", count)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(" OpsDesk Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(saved, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Chat => " CHAT ",
        Screen::Components => " COMPONENTS ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match (app.screen, app.input_mode, &app.edit_target) {
        (_, InputMode::Editing, EditTarget::Field { .. }) => &[("Enter", "save"), ("Esc", "cancel")],
        (Screen::Chat, InputMode::Editing, _) => &[("Enter", "send"), ("Esc", "stop typing")],
        (Screen::Chat, InputMode::Normal, _) => &[
            ("i", "type"),
            ("j/k", "scroll"),
            ("2", "components"),
            ("q", "quit"),
        ],
        (Screen::Components, _, _) if app.focus == FocusPane::Records => &[
            ("j/k", "move"),
            ("Enter", "open"),
            ("d", "delete"),
            ("D", "clear"),
            ("Tab", "component"),
            ("1", "chat"),
            ("q", "quit"),
        ],
        (Screen::Components, _, _) => &[
            ("j/k", "control"),
            ("Enter", "activate"),
            ("r", "re-render"),
            ("Tab", "list"),
            ("1", "chat"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style.bold())];
    for (key, label) in hints {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    if let Some(status) = &app.status {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Yellow)));
    } else if app.redirect_pending() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "Opening component...",
            Style::default().fg(Color::Green),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Inner size minus borders, for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", app.model_label()));

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.clone()));
            }
            ChatRole::Assistant => {
                let mut heading = vec![Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )];
                if msg.component_generated {
                    heading.push(Span::styled(" [component]", Style::default().fg(Color::Green)));
                }
                if msg.parse_failed {
                    heading.push(Span::styled(" [unparsed reply]", Style::default().fg(Color::Red)));
                }
                lines.push(Line::from(heading));
                for line in msg.content.lines() {
                    lines.push(styled_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.session.is_sending() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Generating{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let title = if app.session.is_sending() {
        " Describe what you need (waiting for reply) "
    } else {
        " Describe what you need "
    };
    render_input_box(app, frame, input_area, title);
}

/// Single-line text box with horizontal scrolling and a cursor while editing.
fn render_input_box(app: &App, frame: &mut Frame, area: Rect, title: &str) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.cursor < inner_width {
        0
    } else {
        app.cursor - inner_width + 1
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_components_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, view_area] = Layout::horizontal([
        Constraint::Percentage(30),
        Constraint::Percentage(70),
    ])
    .areas(area);

    render_records(app, frame, list_area);

    let editing_field = matches!(app.edit_target, EditTarget::Field { .. });
    let (view_area, field_area) = if editing_field {
        let [view, field] = Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(view_area);
        (view, Some(field))
    } else {
        (view_area, None)
    };

    let focused = app.focus == FocusPane::Component;
    match &app.view {
        Some(view) => render_view(view, focused, frame, view_area),
        None => {
            let hint = if app.registry.is_empty() {
                "Nothing generated yet. Ask for a form or a report on the chat screen (press 1)."
            } else {
                "Select a component and press Enter to open it."
            };
            let empty = Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray)))
                .block(Block::default().borders(Borders::ALL).title(" Component "))
                .wrap(Wrap { trim: true });
            frame.render_widget(empty, view_area);
        }
    }

    if let (Some(field_area), EditTarget::Field { label, .. }) = (field_area, &app.edit_target) {
        let title = format!(" {} ", if label.is_empty() { "Value" } else { label });
        render_input_box(app, frame, field_area, &title);
    }
}

fn render_records(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Records;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let active = app.registry.active().map(|r| r.id);
    let items: Vec<ListItem> = app
        .registry
        .list()
        .iter()
        .map(|record| {
            let marker = if Some(record.id) == active { "● " } else { "  " };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Green)),
                    Span::raw(record.title.clone()),
                ]),
                Line::from(Span::styled(
                    format!("  {}", record.created_at.format("%Y-%m-%d %H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(format!(" Generated ({}) ", app.registry.len())),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    // Two lines per record
    let visible_height = (area.height.saturating_sub(2) / 2) as usize;
    ensure_selected_visible(&mut app.records_state, visible_height);
    frame.render_stateful_widget(list, area, &mut app.records_state);
}

fn render_view(view: &ComponentView, focused: bool, frame: &mut Frame, area: Rect) {
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", view.title));

    let mut lines: Vec<Line> = Vec::new();

    if let Some(error) = &view.error {
        lines.push(Line::from(Span::styled(
            "Error rendering component",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::default());
        lines.push(Line::from(Span::styled("Code:", Style::default().bold())));
        for line in error.code().lines() {
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::DarkGray),
            )));
        }
    } else if let Some(tree) = &view.tree {
        let selected = focused.then_some(view.selected);
        let mut counter = 0;
        tree_lines(tree, 0, selected, &mut counter, &mut lines);
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((view.scroll, 0));
    frame.render_widget(paragraph, area);
}

/// Lay a rendered tree out as lines. `counter` numbers the interactive
/// nodes in walk order so the selected one can be highlighted.
fn tree_lines(
    node: &UiNode,
    depth: usize,
    selected: Option<usize>,
    counter: &mut usize,
    lines: &mut Vec<Line<'static>>,
) {
    let indent = "  ".repeat(depth);
    let mut control_style = |base: Style| {
        let is_selected = selected == Some(*counter);
        *counter += 1;
        if is_selected {
            base.bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            base
        }
    };

    match node {
        UiNode::Element { tag, props, children } => {
            let title = props.iter().find(|(k, _)| k == "title").map(|(_, v)| v.clone());
            let child_depth = match (tag.as_str(), title) {
                (_, Some(title)) => {
                    lines.push(Line::from(Span::styled(
                        format!("{}┌ {}", indent, title),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    depth + 1
                }
                ("h1" | "h2" | "h3" | "h4", None) => {
                    let text = node.plain_text();
                    lines.push(Line::from(Span::styled(
                        format!("{}{}", indent, text),
                        Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    )));
                    return;
                }
                _ => depth,
            };
            for child in children {
                tree_lines(child, child_depth, selected, counter, lines);
            }
        }
        UiNode::Text(text) => {
            for line in text.lines() {
                lines.push(Line::from(format!("{}{}", indent, line)));
            }
        }
        UiNode::Input {
            label,
            kind,
            placeholder,
            value,
            ..
        } => {
            let shown = if value.is_empty() {
                placeholder.clone()
            } else if kind == "password" {
                "*".repeat(value.chars().count())
            } else {
                value.clone()
            };
            let style = control_style(Style::default().fg(Color::Yellow));
            lines.push(Line::from(vec![
                Span::raw(format!("{}{}: ", indent, label)),
                Span::styled(format!("[{}]", shown), style),
            ]));
        }
        UiNode::Select {
            label,
            options,
            value,
            ..
        } => {
            let current = options
                .iter()
                .find(|o| &o.value == value)
                .map(|o| o.label.clone())
                .unwrap_or_else(|| "-- choose --".to_string());
            let style = control_style(Style::default().fg(Color::Yellow));
            lines.push(Line::from(vec![
                Span::raw(format!("{}{}: ", indent, label)),
                Span::styled(format!("< {} >", current), style),
            ]));
        }
        UiNode::Button {
            label, disabled, ..
        } => {
            let base = if *disabled {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Green)
            };
            let style = control_style(base);
            lines.push(Line::from(vec![
                Span::raw(indent),
                Span::styled(format!("[ {} ]", label), style),
            ]));
        }
        UiNode::Link { href, label } => {
            let style = control_style(Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            lines.push(Line::from(vec![
                Span::raw(indent),
                Span::styled(label.clone(), style),
                Span::styled(format!(" ({})", href), Style::default().fg(Color::DarkGray)),
            ]));
        }
        UiNode::Table { columns, rows } => {
            let widths: Vec<usize> = (0..columns.len())
                .map(|i| {
                    rows.iter()
                        .filter_map(|row| row.get(i))
                        .chain(std::iter::once(&columns[i]))
                        .map(|cell| cell.chars().count())
                        .max()
                        .unwrap_or(0)
                })
                .collect();
            let format_row = |cells: &[String]| {
                cells
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let width = widths.get(i).copied().unwrap_or(0);
                        format!("{:<width$}", cell, width = width)
                    })
                    .collect::<Vec<_>>()
                    .join(" │ ")
            };
            lines.push(Line::from(Span::styled(
                format!("{}{}", indent, format_row(columns.as_slice())),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for row in rows {
                lines.push(Line::from(format!("{}{}", indent, format_row(row.as_slice()))));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_styled_line_spans() {
        let line = styled_line("Use **Save** then `refresh`");
        let parts: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(parts, vec!["Use ", "Save", " then ", "refresh"]);

        let unclosed = styled_line("a ** b");
        assert_eq!(unclosed.spans.len(), 1);
    }

    #[test]
    fn test_tree_lines_layout() {
        let tree = UiNode::Element {
            tag: "card".into(),
            props: vec![("title".into(), "Stock".into())],
            children: vec![
                UiNode::Table {
                    columns: vec!["Name".into(), "Qty".into()],
                    rows: vec![vec!["Widget".into(), "3".into()]],
                },
                UiNode::Button {
                    label: "Save".into(),
                    disabled: false,
                    on_click: None,
                },
            ],
        };
        let mut lines = Vec::new();
        let mut counter = 0;
        tree_lines(&tree, 0, Some(0), &mut counter, &mut lines);

        assert_eq!(
            flat(&lines),
            vec!["┌ Stock", "  Name   │ Qty", "  Widget │ 3  ", "  [ Save ]"]
        );
        assert_eq!(counter, 1);
        assert_eq!(lines[3].spans[1].style.bg, Some(Color::Blue));
    }
}
