use ratatui::crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::action::Action;

/// Map a crossterm terminal event to a TUI action.
///
/// In `typing` mode printable keys become [`Action::Input`] so the sign-in
/// form and prompts receive them verbatim.
pub fn map_event(event: &Event, typing: bool) -> Action {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if typing {
                map_text_key(key)
            } else {
                map_key(key)
            }
        }
        Event::Resize(w, h) => Action::Resize(*w, *h),
        _ => Action::None,
    }
}

fn map_text_key(key: &KeyEvent) -> Action {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Action::Quit,
        KeyCode::Char('r') if ctrl => Action::ToggleRegister,
        KeyCode::Char(c) => Action::Input(c),
        KeyCode::Backspace => Action::Backspace,
        KeyCode::Tab | KeyCode::Down => Action::NextField,
        KeyCode::Enter => Action::Submit,
        KeyCode::Esc => Action::NavigateBack,
        _ => Action::None,
    }
}

fn map_key(key: &KeyEvent) -> Action {
    // Ctrl+C always quits
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Action::Quit;
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => Action::MoveDown,
        KeyCode::Char('k') | KeyCode::Up => Action::MoveUp,
        KeyCode::Enter => Action::DrillIn,
        KeyCode::Esc => Action::NavigateBack,
        KeyCode::Char('g') => Action::GoTop,
        KeyCode::Char('G') => Action::GoBottom,
        KeyCode::Char('?') => Action::ToggleHelp,
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::PageDown,
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::PageUp,
        KeyCode::PageDown => Action::PageDown,
        KeyCode::PageUp => Action::PageUp,
        KeyCode::Home => Action::GoTop,
        KeyCode::End => Action::GoBottom,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('n') => Action::NewProject,
        KeyCode::Char('X') => Action::DeleteProject,
        KeyCode::Char('O') => Action::SignOut,
        KeyCode::Char('t') => Action::SubmitText,
        KeyCode::Char('a') => Action::UploadAudio,
        KeyCode::Char('v') => Action::UploadVideo,
        KeyCode::Char('b') => Action::GenerateDraft,
        KeyCode::Char('i') => Action::GenerateImage,
        KeyCode::Char('I') => Action::GenerateAllImages,
        KeyCode::Char('p') => Action::GeneratePdf,
        KeyCode::Char('D') => Action::Download,
        KeyCode::Char('R') => Action::Retry,
        KeyCode::Char('l') => Action::ToggleLock,
        KeyCode::Char('x') => Action::DeleteChapter,
        KeyCode::Char('K') => Action::MoveChapterUp,
        KeyCode::Char('J') => Action::MoveChapterDown,
        KeyCode::Char('e') => Action::RenameChapter,
        KeyCode::Char('c') => Action::EditCover,
        KeyCode::Char('u') => Action::AttachImage,
        KeyCode::Char('U') => Action::ClearImage,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn typing_mode_captures_letters() {
        let q = press(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(map_event(&q, true), Action::Input('q'));
        assert_eq!(map_event(&q, false), Action::Quit);
    }

    #[test]
    fn ctrl_c_quits_in_both_modes() {
        let ctrl_c = press(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_event(&ctrl_c, true), Action::Quit);
        assert_eq!(map_event(&ctrl_c, false), Action::Quit);
    }

    #[test]
    fn chapter_keys() {
        let none = KeyModifiers::NONE;
        assert_eq!(map_event(&press(KeyCode::Char('l'), none), false), Action::ToggleLock);
        assert_eq!(
            map_event(&press(KeyCode::Char('J'), KeyModifiers::SHIFT), false),
            Action::MoveChapterDown
        );
        assert_eq!(map_event(&press(KeyCode::F(5), none), false), Action::None);
    }
}
