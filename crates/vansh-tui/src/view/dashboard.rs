use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use ratatui::Frame;

use crate::app::App;
use crate::view::{render_footer, render_header, truncate};

/// Render the project dashboard.
pub fn render(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Min(5),   // table
        Constraint::Length(1), // footer / notice
    ])
    .split(area);

    render_header(f, chunks[0], app, &["Stories"]);
    if app.projects.is_empty() {
        render_empty(f, chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }
    render_footer(
        f,
        chunks[2],
        app,
        "j/k:nav  Enter:open  n:new  X:delete  r:refresh  O:sign out  ?:help  q:quit",
    );
}

fn render_empty(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let text = Paragraph::new(vec![
        Line::from(""),
        Line::styled("  No stories yet.", Style::default().fg(theme.text)),
        Line::styled(
            "  Press n to start one, then record, upload or type it.",
            Style::default().fg(theme.dim),
        ),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border_style())
            .title(" Your stories "),
    );
    f.render_widget(text, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let wide = area.width >= 90;

    let header_cells = if wide {
        vec!["#", "Title", "Source", "Chapters", "Images", "Status", "Updated"]
    } else {
        vec!["#", "Title", "Chapters", "Status"]
    };
    let header = Row::new(
        header_cells
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD))),
    )
    .height(1);

    let rows: Vec<Row> = app
        .projects
        .iter()
        .enumerate()
        .map(|(i, project)| {
            let num = format!("{}", i + 1);
            let title = truncate(project.display_title(), (area.width as usize).saturating_sub(50));
            let status = Cell::from(project.status.label().to_string())
                .style(Style::default().fg(theme.status_color(&project.status)));
            let chapters = if project.chapters.is_empty() {
                "—".to_string()
            } else {
                project.chapters.len().to_string()
            };

            if wide {
                let updated = project
                    .updated_at
                    .or(project.created_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                Row::new(vec![
                    Cell::from(num),
                    Cell::from(title),
                    Cell::from(project.input_type.as_str()),
                    Cell::from(chapters),
                    Cell::from(format!(
                        "{}/{}",
                        project.illustrated_count(),
                        project.chapters.len()
                    )),
                    status,
                    Cell::from(updated).style(Style::default().fg(theme.dim)),
                ])
            } else {
                Row::new(vec![
                    Cell::from(num),
                    Cell::from(title),
                    Cell::from(chapters),
                    status,
                ])
            }
        })
        .collect();

    let widths = if wide {
        vec![
            Constraint::Length(4),
            Constraint::Min(20),
            Constraint::Length(13),
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(15),
            Constraint::Length(17),
        ]
    } else {
        vec![
            Constraint::Length(4),
            Constraint::Min(15),
            Constraint::Length(9),
            Constraint::Length(15),
        ]
    };

    let table = Table::new(rows, &widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(format!(" Your stories ({}) ", app.projects.len())),
        )
        .row_highlight_style(theme.highlight_style());

    let mut state = TableState::default();
    state.select(Some(app.dashboard_cursor));
    f.render_stateful_widget(table, area, &mut state);
}
