use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::model::prompt::{Prompt, PromptKind};
use crate::theme::Theme;
use crate::view::centered_rect;

/// Render a one-line text prompt as a centered popup.
pub fn render(f: &mut Frame, prompt: &Prompt, theme: &Theme) {
    let area = f.area();
    let long = matches!(prompt.kind, PromptKind::NarrativeText);
    let width = area.width.saturating_sub(4).min(if long { 100 } else { 72 });
    let popup = centered_rect(width, if long { 12 } else { 5 }, area);

    let lines = vec![
        Line::from(vec![
            Span::styled(prompt.buffer.clone(), Style::default().fg(theme.text)),
            Span::styled("▏", Style::default().fg(theme.active)),
        ]),
        Line::from(Span::styled(
            "Enter:confirm  Esc:cancel",
            Style::default().fg(theme.dim),
        )),
    ];

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.active))
                .title(format!(" {} ", prompt.kind.title())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup);
    f.render_widget(paragraph, popup);
}
