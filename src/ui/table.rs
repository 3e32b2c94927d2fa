use ratatui::layout::{Alignment, Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use ratatui::Frame;

use crate::app::App;
use crate::pagination::FetchStatus;
use crate::types::{Entity, Record};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let entity = app.entity();
    let view = app.list().view();

    let mut title = vec![Span::styled(
        format!(" {} Management ", entity.label()),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(error) = view.error {
        title.push(Span::styled(
            format!(" {} ", error),
            Style::default().fg(Color::Red),
        ));
    }
    let block = Block::default().borders(Borders::ALL).title(Line::from(title));

    if view.records.is_empty() {
        let (text, color) = if view.is_pending {
            ("Loading...", Color::Yellow)
        } else if view.error.is_some() {
            ("Could not load this page. Press r to retry.", Color::Red)
        } else {
            ("No records found", Color::Gray)
        };
        let empty = Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(color));
        frame.render_widget(empty, area);
        return;
    }

    // placeholder rows are dimmed until the current page arrives
    let row_style = if view.is_placeholder {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    let rows: Vec<Row> = view
        .records
        .iter()
        .map(|record| Row::new(cells(record)).style(row_style))
        .collect();

    let header = Row::new(
        columns(entity)
            .iter()
            .map(|c| Cell::from(*c))
            .collect::<Vec<_>>(),
    )
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let table = Table::new(rows, widths(entity))
        .header(header)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    if !view.is_placeholder {
        state.select(Some(app.selected));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

pub fn render_pagination(frame: &mut Frame, app: &App, area: Rect) {
    let list = app.list();
    let enabled = Style::default().fg(Color::White);
    let disabled = Style::default().fg(Color::DarkGray);

    let mut spans = vec![
        Span::styled(
            "‹ Prev",
            if list.has_previous_page() {
                enabled
            } else {
                disabled
            },
        ),
        Span::raw(format!("   Page {}   ", list.page())),
        Span::styled(
            "Next ›",
            if list.has_next_page() {
                enabled
            } else {
                disabled
            },
        ),
    ];
    if let Some(count) = list.view().count {
        spans.push(Span::styled(
            format!("   {} total", count),
            Style::default().fg(Color::Gray),
        ));
    }
    if list.status() == FetchStatus::Fetching {
        spans.push(Span::styled(
            "   loading",
            Style::default().fg(Color::Yellow),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).alignment(Alignment::Right);
    frame.render_widget(footer, area);
}

fn columns(entity: Entity) -> &'static [&'static str] {
    match entity {
        Entity::User => &["ID", "Email", "Full name", "Role", "Status"],
        Entity::Item => &["ID", "Title", "Description", "Owner"],
        Entity::Meeting => &["ID", "Title", "Agenda", "Summary"],
    }
}

fn widths(entity: Entity) -> Vec<Constraint> {
    match entity {
        Entity::User => vec![
            Constraint::Length(6),
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
        Entity::Item => vec![
            Constraint::Length(6),
            Constraint::Percentage(30),
            Constraint::Min(20),
            Constraint::Length(8),
        ],
        Entity::Meeting => vec![
            Constraint::Length(6),
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Min(20),
        ],
    }
}

fn optional(value: &Option<String>) -> Cell<'static> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Cell::from(truncate(v, 60)),
        _ => Cell::from("N/A").style(Style::default().fg(Color::DarkGray)),
    }
}

fn cells(record: &Record) -> Vec<Cell<'static>> {
    match record {
        Record::User(u) => vec![
            Cell::from(u.id.to_string()),
            Cell::from(truncate(&u.email, 40)),
            optional(&u.full_name),
            Cell::from(if u.is_superuser { "Superuser" } else { "User" }),
            if u.is_active {
                Cell::from("Active").style(Style::default().fg(Color::Green))
            } else {
                Cell::from("Inactive").style(Style::default().fg(Color::Red))
            },
        ],
        Record::Item(i) => vec![
            Cell::from(i.id.to_string()),
            Cell::from(truncate(&i.title, 40)),
            optional(&i.description),
            Cell::from(i.owner_id.to_string()),
        ],
        Record::Meeting(m) => vec![
            Cell::from(m.id.to_string()),
            Cell::from(truncate(&m.title, 40)),
            Cell::from(truncate(&m.agenda, 60)),
            optional(&m.summary),
        ],
    }
}

/// Cut to at most `max` characters, marking the cut with an ellipsis
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
