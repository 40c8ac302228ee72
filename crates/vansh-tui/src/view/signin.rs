use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::model::form::Field;
use crate::view::{centered_rect, render_footer, spinner_char};

/// Render the sign-in / registration form.
pub fn render(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let form = &app.form;
    let area = f.area();

    let chunks = Layout::vertical([Constraint::Min(10), Constraint::Length(1)]).split(area);
    let popup = centered_rect(56, if form.register { 13 } else { 11 }, chunks[0]);

    let mut lines = vec![
        Line::from(Span::styled(
            "Every family has a story worth keeping.",
            Style::default().fg(theme.dim),
        )),
        Line::from(""),
    ];

    for field in form.fields() {
        let (label, value) = match field {
            Field::Name => ("Name", form.name.clone()),
            Field::Email => ("Email", form.email.clone()),
            Field::Password => ("Password", "•".repeat(form.password.chars().count())),
        };
        let focused = *field == form.focus;
        let cursor = if focused { "▏" } else { "" };
        let style = if focused {
            Style::default().fg(theme.active).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {label:<10}"), Style::default().fg(theme.dim)),
            Span::styled(format!("{value}{cursor}"), style),
        ]));
        lines.push(Line::from(""));
    }

    let status = if form.busy {
        Line::from(Span::styled(
            format!("  {} Signing in...", spinner_char(app.tick)),
            Style::default().fg(theme.spinner),
        ))
    } else if let Some(error) = &form.error {
        Line::from(Span::styled(
            format!("  {error}"),
            Style::default().fg(theme.failed),
        ))
    } else {
        Line::from("")
    };
    lines.push(status);

    let title = if form.register {
        " Create your account "
    } else {
        " Sign in to VANSH "
    };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.active))
                .title(title),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, popup);

    let switch = if form.register {
        "Ctrl+r:have an account"
    } else {
        "Ctrl+r:register"
    };
    render_footer(
        f,
        chunks[1],
        app,
        &format!("Tab:next field  Enter:submit  {switch}  Ctrl+c:quit"),
    );
}
