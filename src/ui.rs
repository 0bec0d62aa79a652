use ratatui::{
    prelude::*,
    style::Style,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::app::{Mode, Severity, StatusMessage};
use crate::models::VaultItem;

const TITLE: &str = "bw-tui - Bitwarden Terminal UI";
const BROWSE_HELP: &str = "q:quit | s,/:search | c,Enter:copy | r:sync | l:lock | Esc:clear search";
const SEARCH_HELP: &str = "Type to search | Enter:copy | ↑/↓ move | Esc:clear search";
const UNLOCK_HELP: &str = "Enter:unlock | Esc:cancel | Ctrl+h show/hide";
const COLOR_ACCENT: Color = Color::Rgb(0x17, 0x5D, 0xDC);

pub struct ViewState<'a> {
    pub mode: Mode,
    pub query: &'a str,
    pub items: Vec<&'a VaultItem>,
    pub selection: Option<usize>,
    pub vault_empty: bool,
    pub status: Option<&'a StatusMessage>,
}

pub struct UnlockState<'a> {
    pub input_display: &'a str,
    pub input_visible: bool,
    pub status: Option<&'a StatusMessage>,
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Blue,
        Severity::Success => Color::Green,
        Severity::Error => Color::Red,
    }
}

fn status_line(status: &StatusMessage) -> Line<'_> {
    Line::from(Span::styled(
        status.text.as_str(),
        Style::default()
            .fg(severity_color(status.severity))
            .add_modifier(Modifier::BOLD),
    ))
}

/// `name (username)`, cut to `max_width` with a trailing ellipsis.
pub fn item_label(item: &VaultItem, max_width: usize) -> String {
    let label = match item.username() {
        Some(user) if !user.is_empty() => format!("{} ({user})", item.name),
        _ => item.name.clone(),
    };
    if label.chars().count() <= max_width {
        return label;
    }
    let keep = max_width.saturating_sub(3);
    let mut cut: String = label.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

pub fn draw(f: &mut Frame<'_>, state: &ViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(1),    // items
            Constraint::Length(4), // status
        ])
        .split(f.size());

    let header_text = match state.mode {
        Mode::Search => format!("Search: {}_", state.query),
        _ if !state.query.is_empty() => format!("Filter: {}", state.query),
        _ => "Browse".to_string(),
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            header_text,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                TITLE,
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(header, layout[0]);

    let max_width = layout[1].width.saturating_sub(4) as usize;
    let rows: Vec<ListItem> = if state.items.is_empty() {
        let empty = if state.vault_empty {
            "No items in vault"
        } else {
            "No items found"
        };
        vec![ListItem::new(Span::styled(
            empty,
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state
            .items
            .iter()
            .map(|item| ListItem::new(item_label(item, max_width)))
            .collect()
    };
    let mut list_state = ListState::default();
    if !state.items.is_empty() {
        list_state.select(state.selection);
    }
    let list = List::new(rows)
        .block(Block::default().title("Items").borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, layout[1], &mut list_state);

    let help = match state.mode {
        Mode::Search => SEARCH_HELP,
        _ => BROWSE_HELP,
    };
    let second = match (state.status, state.selection) {
        (Some(status), _) => status_line(status),
        (None, Some(idx)) if !state.items.is_empty() => {
            Line::from(format!("Item {} of {}", idx + 1, state.items.len()))
        }
        _ => Line::from(""),
    };
    let footer = Paragraph::new(vec![Line::from(help), second])
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[2]);
}

pub fn draw_unlock(f: &mut Frame<'_>, state: &UnlockState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // top padding
            Constraint::Length(2), // title
            Constraint::Length(5), // input area
            Constraint::Min(0),    // spacer
            Constraint::Length(4), // footer
        ])
        .split(f.size());

    let title = Paragraph::new(Span::styled(
        "bw-tui - Unlock Vault",
        Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center);
    f.render_widget(title, layout[1]);

    // Centered narrow input box with its label on the first row
    let box_width: u16 = 44;
    let input_area = layout[2];
    let w = box_width.min(input_area.width);
    let x = input_area.x + input_area.width.saturating_sub(w) / 2;
    let label_area = Rect::new(x, input_area.y, w, 1);
    let box_area = Rect::new(x, input_area.y + 1, w, 3.min(input_area.height.saturating_sub(1)));

    let label = Paragraph::new("Enter your master password")
        .alignment(Alignment::Center)
        .style(Style::default().add_modifier(Modifier::BOLD));
    f.render_widget(label, label_area);

    let prompt = Paragraph::new(format!("> {}", state.input_display)).block(
        Block::default().borders(Borders::ALL).title(if state.input_visible {
            "Password (visible)"
        } else {
            "Password (hidden)"
        }),
    );
    f.render_widget(prompt, box_area);

    let second = state.status.map(status_line).unwrap_or_default();
    let footer = Paragraph::new(vec![Line::from(UNLOCK_HELP), second])
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[4]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Login;

    fn item(name: &str, username: Option<&str>) -> VaultItem {
        VaultItem {
            id: name.to_lowercase(),
            name: name.to_string(),
            login: Some(Login {
                username: username.map(str::to_string),
                password: None,
            }),
        }
    }

    #[test]
    fn label_includes_username_when_present() {
        assert_eq!(item_label(&item("GitHub", Some("alice")), 80), "GitHub (alice)");
        assert_eq!(item_label(&item("Notes", None), 80), "Notes");
        assert_eq!(item_label(&item("Notes", Some("")), 80), "Notes");
    }

    #[test]
    fn long_labels_are_truncated() {
        let label = item_label(&item("A very long entry name", Some("someone")), 10);
        assert_eq!(label, "A very ...");
        assert_eq!(label.chars().count(), 10);
    }
}
