use ratatui::style::{Color, Modifier, Style};

use vansh_core::{ProjectStatus, StepState};

use crate::app::PushState;

/// Color theme for the TUI.
pub struct Theme {
    pub done: Color,
    pub failed: Color,
    pub warning: Color,
    pub locked: Color,

    pub header_fg: Color,
    pub header_bg: Color,
    pub border: Color,
    pub text: Color,
    pub dim: Color,
    pub highlight_bg: Color,
    pub active: Color,
    pub queued: Color,
    pub spinner: Color,
    pub footer_fg: Color,
    pub footer_bg: Color,
}

impl Theme {
    /// Warm parchment-and-saffron theme.
    pub fn heritage() -> Self {
        Self {
            done: Color::Green,
            failed: Color::Red,
            warning: Color::Yellow,
            locked: Color::Magenta,

            header_fg: Color::Black,
            header_bg: Color::Rgb(230, 160, 60),
            border: Color::DarkGray,
            text: Color::White,
            dim: Color::DarkGray,
            highlight_bg: Color::Rgb(60, 45, 25),
            active: Color::Rgb(230, 160, 60),
            queued: Color::DarkGray,
            spinner: Color::Cyan,
            footer_fg: Color::DarkGray,
            footer_bg: Color::Reset,
        }
    }

    pub fn status_color(&self, status: &ProjectStatus) -> Color {
        match status {
            ProjectStatus::Created => self.queued,
            ProjectStatus::Transcribing | ProjectStatus::Writing => self.active,
            ProjectStatus::Transcribed => self.text,
            ProjectStatus::ChaptersReady | ProjectStatus::ImagesReady => self.warning,
            ProjectStatus::Complete => self.done,
            ProjectStatus::Unknown(_) => self.dim,
        }
    }

    pub fn step_style(&self, state: StepState) -> Style {
        match state {
            StepState::Done => Style::default().fg(self.done),
            StepState::Active => Style::default().fg(self.spinner).add_modifier(Modifier::BOLD),
            StepState::Pending => Style::default().fg(self.dim),
            StepState::Halted => Style::default().fg(self.failed).add_modifier(Modifier::BOLD),
        }
    }

    pub fn push_style(&self, state: &PushState) -> Style {
        let color = match state {
            PushState::Connected => self.done,
            PushState::Reconnecting { .. } => self.warning,
            PushState::Offline => self.dim,
            PushState::Disconnected(_) => self.failed,
        };
        Style::default().fg(color)
    }

    pub fn header_style(&self) -> Style {
        Style::default().fg(self.header_fg).bg(self.header_bg).add_modifier(Modifier::BOLD)
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().bg(self.highlight_bg).add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn footer_style(&self) -> Style {
        Style::default().fg(self.footer_fg).bg(self.footer_bg)
    }
}
