mod popup;
mod table;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::action::MenuAction;
use crate::app::{App, Popup};
use crate::types::Entity;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    table::render(frame, app, chunks[1]);
    table::render_pagination(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    match &app.popup {
        Some(Popup::Actions { record, selected }) => {
            let entity = record.entity();
            let items: Vec<String> = MenuAction::ALL.iter().map(|a| a.label(entity)).collect();
            popup::render_select(
                frame,
                &format!("{} #{}", entity.label(), record.id()),
                &items,
                *selected,
            );
        }
        Some(Popup::ConfirmDelete { entity, id }) => {
            popup::render_confirm(
                frame,
                &format!("Delete {}", entity.label()),
                &format!("Delete {} #{}? This cannot be undone.", entity.label(), id),
            );
        }
        None => {}
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            "roster",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
    ];

    for entity in Entity::ALL {
        let label = format!(" {} {} ", entity.index() + 1, entity.plural());
        let style = if entity == app.entity() {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    spans.push(Span::styled(
        app.nav.location(),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(error) = &app.error {
        Line::from(vec![Span::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red),
        )])
    } else if app.busy {
        Line::from(vec![Span::styled(
            "Saving...",
            Style::default().fg(Color::Yellow),
        )])
    } else if let Some(notice) = &app.notice {
        Line::from(vec![Span::styled(
            notice.as_str(),
            Style::default().fg(Color::Green),
        )])
    } else {
        let help = match app.popup {
            Some(Popup::Actions { .. }) => "j/k: nav | Enter: select | Esc: close",
            Some(Popup::ConfirmDelete { .. }) => "y: delete | n: cancel",
            None => {
                "j/k/g/G: rows | n/p: page | 0: first page | Tab/1-3: views | Enter: actions | a: add | r: refresh | q: quit"
            }
        };
        Line::from(vec![Span::styled(help, Style::default().fg(Color::Gray))])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}
