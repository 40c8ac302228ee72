//! Colored terminal output. Colors honor `--no-color`, `NO_COLOR` and
//! whether stdout is a terminal.

use std::fmt::Display;

use owo_colors::{OwoColorize, Stream};
use vansh_core::{Chapter, ImageType, Phase, ProjectStatus, ProjectView, StepState, Tracker};

pub fn ok(text: impl Display) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.green()).to_string()
}

pub fn warn(text: impl Display) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.yellow()).to_string()
}

pub fn err(text: impl Display) -> String {
    text.if_supports_color(Stream::Stderr, |t| t.red()).to_string()
}

pub fn dim(text: impl Display) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.dimmed()).to_string()
}

pub fn bold(text: impl Display) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.bold()).to_string()
}

pub fn status(status: &ProjectStatus) -> String {
    match status {
        ProjectStatus::Complete => ok(status.label()),
        ProjectStatus::Transcribing | ProjectStatus::Writing => warn(status.label()),
        ProjectStatus::Unknown(_) => dim(status.label()),
        _ => status.label().to_string(),
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per project.
pub fn project_list(projects: &[ProjectView]) {
    if projects.is_empty() {
        println!("{}", dim("No stories yet. Start one with `vansh projects create`."));
        return;
    }
    for p in projects {
        let updated = p
            .updated_at
            .or(p.created_at)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{}  {}  {}  {} ch  {}",
            dim(&p.id),
            bold(p.display_title()),
            status(&p.status),
            p.chapters.len(),
            dim(updated),
        );
    }
}

pub fn project_detail(project: &ProjectView) {
    println!("{}", bold(project.display_title()));
    if let Some(subtitle) = project.cover_subtitle.as_deref().filter(|s| !s.is_empty()) {
        println!("{}", dim(subtitle));
    }
    println!(
        "{} {}   {} {}   {} {}",
        dim("id"),
        project.id,
        dim("source"),
        project.input_type.as_str(),
        dim("status"),
        status(&project.status),
    );
    if let Some(url) = &project.pdf_url {
        println!("{} {}", dim("pdf"), url);
    }
    println!();
    chapters(&project.chapters);
}

pub fn chapters(chapters: &[Chapter]) {
    if chapters.is_empty() {
        println!("{}", dim("No chapters drafted yet."));
        return;
    }
    for (i, c) in chapters.iter().enumerate() {
        let image = match c.image_type {
            ImageType::None => String::new(),
            other => dim(format!("[{}]", other.label())),
        };
        let lock = if c.locked { warn(" locked") } else { String::new() };
        println!("{:>3}. {}{} {}  {}", i + 1, c.title, lock, image, dim(&c.id));
    }
}

/// Five-step tracker line, e.g. `✓ Capture  ● Refine  ○ Compose ...`.
pub fn tracker_line(tracker: &Tracker) -> String {
    tracker
        .steps
        .iter()
        .map(|(phase, state)| step(*phase, *state))
        .collect::<Vec<_>>()
        .join("  ")
}

fn step(phase: Phase, state: StepState) -> String {
    match state {
        StepState::Done => ok(format!("✓ {}", phase.label())),
        StepState::Active => bold(format!("● {}", phase.label())),
        StepState::Pending => dim(format!("○ {}", phase.label())),
        StepState::Halted => err(format!("✕ {}", phase.label())),
    }
}
