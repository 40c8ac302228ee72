/// Actions that the TUI can process, mapped from keyboard input or internal events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NavigateBack,
    DrillIn,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    GoTop,
    GoBottom,
    ToggleHelp,
    Refresh,

    // Text entry (sign-in form and prompts)
    Input(char),
    Backspace,
    NextField,
    Submit,
    ToggleRegister,

    // Dashboard
    NewProject,
    DeleteProject,
    SignOut,

    // Project jobs
    SubmitText,
    UploadAudio,
    UploadVideo,
    GenerateDraft,
    GenerateImage,
    GenerateAllImages,
    GeneratePdf,
    Download,
    Retry,

    // Chapter curation
    ToggleLock,
    DeleteChapter,
    MoveChapterUp,
    MoveChapterDown,
    RenameChapter,
    EditCover,
    AttachImage,
    ClearImage,

    Tick,
    Resize(u16, u16),
    None,
}
