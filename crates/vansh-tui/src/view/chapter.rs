use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::theme::Theme;
use crate::view::{render_footer, render_header};

/// Render the full text of the selected chapter.
pub fn render(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let area = f.area();
    let Some(project) = app.projector.project() else {
        return;
    };
    let Some(chapter) = project.chapters.get(app.chapter_cursor) else {
        return;
    };

    let chunks = Layout::vertical([
        Constraint::Length(1), // breadcrumb
        Constraint::Min(5),   // scrollable content
        Constraint::Length(1), // footer
    ])
    .split(area);

    let crumb = format!("{}. {}", app.chapter_cursor + 1, chapter.title);
    render_header(f, chunks[0], app, &["Stories", project.display_title(), crumb.as_str()]);

    let mut lines: Vec<Line> = Vec::new();
    section_header(&mut lines, "CHAPTER", theme);
    labeled_line(&mut lines, "Title", &chapter.title, theme);
    if let Some(summary) = chapter.summary.as_deref().filter(|s| !s.is_empty()) {
        labeled_line(&mut lines, "Summary", summary, theme);
    }
    labeled_line(
        &mut lines,
        "Locked",
        if chapter.locked { "yes" } else { "no" },
        theme,
    );

    lines.push(Line::from(""));
    section_header(&mut lines, "ILLUSTRATION", theme);
    match &chapter.image_url {
        Some(url) => {
            labeled_line(&mut lines, "Image", url, theme);
            labeled_line(&mut lines, "Source", chapter.image_type.label(), theme);
        }
        None => labeled_line(&mut lines, "Image", "none (i: generate, u: upload)", theme),
    }

    lines.push(Line::from(""));
    section_header(&mut lines, "TEXT", theme);
    for paragraph in chapter.paragraphs() {
        lines.push(Line::from(Span::styled(
            format!("  {paragraph}"),
            Style::default().fg(theme.text),
        )));
        lines.push(Line::from(""));
    }

    let content = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style()),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));
    f.render_widget(content, chunks[1]);

    render_footer(
        f,
        chunks[2],
        app,
        "j/k:scroll  e:rename  l:lock  i:generate image  u:upload image  U:clear image  x:delete  Esc:back",
    );
}

fn section_header<'a>(lines: &mut Vec<Line<'a>>, title: &'a str, theme: &Theme) {
    lines.push(Line::from(Span::styled(
        format!("  {title}"),
        Style::default()
            .fg(theme.active)
            .add_modifier(Modifier::BOLD),
    )));
}

fn labeled_line<'a>(lines: &mut Vec<Line<'a>>, label: &'a str, value: &str, theme: &Theme) {
    lines.push(Line::from(vec![
        Span::styled(
            format!("  {label:<16}"),
            Style::default().fg(theme.dim),
        ),
        Span::styled(value.to_string(), Style::default().fg(theme.text)),
    ]));
}
