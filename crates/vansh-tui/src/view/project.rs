use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;

use vansh_core::{ImageType, ProjectView, StepState, Tracker};

use crate::app::App;
use crate::theme::Theme;
use crate::view::{render_footer, render_header, spinner_char, truncate};

/// Render the open project: the tracker while a job runs, the chapters otherwise.
pub fn render(f: &mut Frame, app: &App) {
    let area = f.area();
    let Some(project) = app.projector.project() else {
        return;
    };

    let chunks = Layout::vertical([
        Constraint::Length(1), // breadcrumb
        Constraint::Length(5), // summary
        Constraint::Min(8),   // tracker or chapters
        Constraint::Length(1), // footer
    ])
    .split(area);

    render_header(f, chunks[0], app, &["Stories", project.display_title()]);
    render_summary(f, chunks[1], app, project);

    if app.projector.in_progress() {
        render_tracker(f, chunks[2], app);
        let hints = if app.projector.is_errored() {
            "R:retry  r:refresh  Esc:back  ?:help  q:quit"
        } else {
            "r:refresh  Esc:back  ?:help  q:quit"
        };
        render_footer(f, chunks[3], app, hints);
    } else {
        render_chapters(f, chunks[2], app, project);
        render_footer(
            f,
            chunks[3],
            app,
            "Enter:read  t:text  a:audio  v:video  b:draft  I:illustrate  p:publish  D:download  l:lock  J/K:move  ?:help",
        );
    }
}

fn render_summary(f: &mut Frame, area: Rect, app: &App, project: &ProjectView) {
    let theme = &app.theme;
    let mut lines = vec![Line::from(vec![
        Span::styled("  Status      ", Style::default().fg(theme.dim)),
        Span::styled(
            project.status.label().to_string(),
            Style::default()
                .fg(theme.status_color(&project.status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("   {} input", project.input_type.as_str()),
            Style::default().fg(theme.dim),
        ),
    ])];

    if let Some(cover) = &project.cover_title {
        let subtitle = project
            .cover_subtitle
            .as_deref()
            .map(|s| format!(" · {s}"))
            .unwrap_or_default();
        lines.push(Line::from(vec![
            Span::styled("  Cover       ", Style::default().fg(theme.dim)),
            Span::styled(format!("{cover}{subtitle}"), Style::default().fg(theme.text)),
        ]));
    }

    let source = project.source_text();
    if !source.is_empty() {
        let words = source.split_whitespace().count();
        lines.push(Line::from(vec![
            Span::styled("  Narrative   ", Style::default().fg(theme.dim)),
            Span::styled(
                format!("{words} words"),
                Style::default().fg(theme.text),
            ),
        ]));
    }

    if let Some(url) = app.celebration.as_ref().or(project.pdf_url.as_ref()) {
        lines.push(Line::from(vec![
            Span::styled("  Book        ", Style::default().fg(theme.dim)),
            Span::styled(
                format!("ready ({url})"),
                Style::default().fg(theme.done).add_modifier(Modifier::BOLD),
            ),
        ]));
    }

    let summary = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border_style())
            .title(" Story "),
    );
    f.render_widget(summary, area);
}

fn render_tracker(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let tracker = app.projector.tracker();
    let preview = app.projector.draft_preview();

    let chunks = Layout::vertical([
        Constraint::Length(3), // steps
        Constraint::Length(3), // gauge
        Constraint::Min(3),   // transcript or draft preview
    ])
    .split(area);

    let steps = Paragraph::new(step_line(&tracker, app.tick, theme)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border_style())
            .title(" Progress "),
    );
    f.render_widget(steps, chunks[0]);

    let gauge_color = if tracker.errored {
        theme.failed
    } else {
        theme.active
    };
    let label = if tracker.message.is_empty() {
        format!("{}%", tracker.percent)
    } else {
        format!("{}% {}", tracker.percent, tracker.message)
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style()),
        )
        .gauge_style(Style::default().fg(gauge_color))
        .percent(u16::from(tracker.percent.min(100)))
        .label(label);
    f.render_widget(gauge, chunks[1]);

    let mut lines: Vec<Line> = Vec::new();
    if tracker.errored {
        lines.push(Line::styled(
            "  The job failed. Press R to try again.",
            Style::default().fg(theme.failed).add_modifier(Modifier::BOLD),
        ));
    } else if !preview.is_empty() {
        for (i, chapter) in preview.iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:>2}. ", i + 1), Style::default().fg(theme.dim)),
                Span::styled(chapter.title.clone(), Style::default().fg(theme.text)),
            ]));
        }
    } else if let Some(project) = app.projector.project() {
        if !project.transcript.is_empty() {
            lines.push(Line::styled(
                tail(&project.transcript, 600),
                Style::default().fg(theme.text),
            ));
        }
    }

    let title = if preview.is_empty() {
        " Transcript "
    } else {
        " Chapters so far "
    };
    let body = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(title),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(body, chunks[2]);
}

fn step_line(tracker: &Tracker, tick: usize, theme: &Theme) -> Line<'static> {
    let mut spans = vec![Span::raw(" ")];
    for (i, (phase, state)) in tracker.steps.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" ── ", Style::default().fg(theme.dim)));
        }
        let marker = match state {
            StepState::Done => '✓',
            StepState::Active => spinner_char(tick),
            StepState::Pending => '○',
            StepState::Halted => '✕',
        };
        spans.push(Span::styled(
            format!("{marker} {}", phase.label()),
            theme.step_style(*state),
        ));
    }
    Line::from(spans)
}

/// Last `max` characters of `text`, starting at a word boundary.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let cut: String = text.chars().skip(count - max).collect();
    match cut.split_once(' ') {
        Some((_, rest)) => format!("…{rest}"),
        None => format!("…{cut}"),
    }
}

fn render_chapters(f: &mut Frame, area: Rect, app: &App, project: &ProjectView) {
    let theme = &app.theme;

    if project.chapters.is_empty() {
        let hint = if project.source_text().trim().is_empty() {
            "  Add the story: t to type it, a to upload audio, v to upload video."
        } else {
            "  The narrative is ready. Press b to draft chapters."
        };
        let empty = Paragraph::new(vec![Line::from(""), Line::styled(hint, Style::default().fg(theme.dim))])
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.border_style())
                    .title(" Chapters "),
            );
        f.render_widget(empty, area);
        return;
    }

    let header = Row::new(
        ["#", "Chapter", "Image", ""]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD))),
    )
    .height(1);

    let rows: Vec<Row> = project
        .chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| {
            let title = truncate(&chapter.title, (area.width as usize).saturating_sub(32));
            let image = match chapter.image_type {
                ImageType::AiGenerated => Cell::from("ai").style(Style::default().fg(theme.done)),
                ImageType::UserUploaded => Cell::from("yours").style(Style::default().fg(theme.done)),
                ImageType::None if chapter.has_image() => Cell::from("yes"),
                ImageType::None => Cell::from("—").style(Style::default().fg(theme.dim)),
            };
            let lock = if chapter.locked {
                Cell::from("locked").style(Style::default().fg(theme.locked))
            } else {
                Cell::from("")
            };
            Row::new(vec![Cell::from(format!("{}", i + 1)), Cell::from(title), image, lock])
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Min(20),
        Constraint::Length(7),
        Constraint::Length(8),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(format!(
                    " Chapters ({} illustrated of {}) ",
                    project.illustrated_count(),
                    project.chapters.len()
                )),
        )
        .row_highlight_style(theme.highlight_style());

    let mut state = TableState::default();
    state.select(Some(app.chapter_cursor));
    f.render_stateful_widget(table, area, &mut state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_starts_at_a_word() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("one two three four", 9), "…four");
    }
}
