use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::theme::Theme;
use crate::view::centered_rect;

/// Render the help overlay as a centered popup.
pub fn render(f: &mut Frame, theme: &Theme) {
    let area = f.area();
    let popup = centered_rect(64, 38.min(area.height), area);

    let lines = vec![
        Line::from(Span::styled(
            " Keyboard Shortcuts ",
            Style::default()
                .fg(theme.header_fg)
                .bg(theme.header_bg)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        section_header("Navigation", theme),
        key_line("j / ↓, k / ↑", "Move down / up", theme),
        key_line("Ctrl+d / Ctrl+u", "Page down / up", theme),
        key_line("g / G", "Go to top / bottom", theme),
        key_line("Enter", "Open story / read chapter", theme),
        key_line("Esc", "Go back", theme),
        Line::from(""),
        section_header("Stories", theme),
        key_line("n", "New story", theme),
        key_line("X", "Delete story", theme),
        key_line("r", "Refresh", theme),
        key_line("O", "Sign out", theme),
        Line::from(""),
        section_header("Capture and generate", theme),
        key_line("t / a / v", "Type text / upload audio / video", theme),
        key_line("b", "Draft chapters", theme),
        key_line("i / I", "Illustrate chapter / all chapters", theme),
        key_line("p", "Publish the PDF", theme),
        key_line("D", "Download the PDF", theme),
        key_line("R", "Retry a failed job", theme),
        Line::from(""),
        section_header("Chapters", theme),
        key_line("e / c", "Rename chapter / edit cover", theme),
        key_line("l", "Lock or unlock", theme),
        key_line("J / K", "Move down / up", theme),
        key_line("u / U", "Upload / clear image", theme),
        key_line("x", "Delete chapter", theme),
        Line::from(""),
        section_header("Global", theme),
        key_line("?", "Toggle this help", theme),
        key_line("q", "Quit", theme),
        key_line("Ctrl+c", "Force quit", theme),
    ];

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.active))
                .title(" Help "),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup);
    f.render_widget(paragraph, popup);
}

fn section_header<'a>(title: &'a str, theme: &Theme) -> Line<'a> {
    Line::from(Span::styled(
        format!("  {title}"),
        Style::default()
            .fg(theme.active)
            .add_modifier(Modifier::BOLD),
    ))
}

fn key_line<'a>(key: &'a str, desc: &'a str, theme: &Theme) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("    {key:<18}"), Style::default().fg(theme.text)),
        Span::styled(desc, Style::default().fg(theme.dim)),
    ])
}
