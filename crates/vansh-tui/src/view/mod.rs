pub mod chapter;
pub mod dashboard;
pub mod help;
pub mod project;
pub mod prompt;
pub mod signin;

use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{App, PushState};

/// Spinner frames for animated progress indication.
const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Get the current spinner character based on a tick counter.
pub fn spinner_char(tick: usize) -> char {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// Truncate a string to fit in `max_width` columns, appending "…" if truncated.
pub fn truncate(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if s.chars().count() <= max_width {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Create a centered rectangle of the given width (columns) and height (rows).
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .split(area);
    Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .split(vertical[0])[0]
}

/// Top line: product badge, breadcrumb, push status and signed-in user.
pub fn render_header(f: &mut Frame, area: Rect, app: &App, crumbs: &[&str]) {
    let theme = &app.theme;
    let mut spans = vec![Span::styled(" VANSH ", theme.header_style())];
    for (i, crumb) in crumbs.iter().enumerate() {
        spans.push(Span::styled(" > ", Style::default().fg(theme.dim)));
        let style = if i + 1 == crumbs.len() {
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        spans.push(Span::styled(truncate(crumb, 40), style));
    }

    let push = match &app.push {
        PushState::Connected => "● live".to_string(),
        PushState::Reconnecting { attempt } => format!("◌ reconnecting ({attempt})"),
        PushState::Offline => "○ offline".to_string(),
        PushState::Disconnected(_) => "✕ disconnected".to_string(),
    };
    spans.push(Span::raw("  "));
    spans.push(Span::styled(push, theme.push_style(&app.push)));
    if let Some(user) = &app.user {
        spans.push(Span::styled(
            format!("  {}", user.name),
            Style::default().fg(theme.dim),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Bottom line: the current notice if any, otherwise the key hints.
pub fn render_footer(f: &mut Frame, area: Rect, app: &App, hints: &str) {
    let theme = &app.theme;
    let line = match &app.notice {
        Some(notice) => {
            let color = if notice.error { theme.failed } else { theme.done };
            Line::from(Span::styled(
                format!(" {}", notice.text),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        }
        None => Line::from(Span::styled(format!(" {hints}"), theme.footer_style())),
    };
    f.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("Grandfather's Journey", 8), "Grandfa…");
        assert_eq!(truncate("दादाजी की कहानी", 20), "दादाजी की कहानी");
        assert_eq!(truncate("abc", 0), "");
    }
}
