use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use vansh_core::{ConflictPolicy, InputType};

#[derive(Parser, Debug)]
#[command(name = "vansh", version)]
#[command(about = "Turn narrated memories into an illustrated biography")]
pub struct Cli {
    /// Backend origin (e.g. http://localhost:5000)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Socket.IO endpoint, derived from --api-url when unset
    #[arg(long, global = true)]
    pub push_url: Option<String>,

    /// Where the signed-in session is stored
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    /// Path to a config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// How server state and local edits reconcile: last-write-wins or reject-stale
    #[arg(long, global = true)]
    pub conflict_policy: Option<ConflictPolicy>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value_t = false)]
    pub no_color: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long, env = "VANSH_EMAIL")]
        email: String,
        /// Read from stdin when omitted
        #[arg(long, env = "VANSH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long, env = "VANSH_EMAIL")]
        email: String,
        #[arg(long, env = "VANSH_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage biography projects
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
    /// Send narrative text for refinement
    Text {
        project: String,
        /// Narrative text; read from --file or stdin when omitted
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Upload an audio recording for transcription
    Transcribe {
        project: String,
        audio: PathBuf,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Upload a video; its audio track is extracted and transcribed
    UploadVideo {
        project: String,
        video: PathBuf,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Draft chapters from the refined narrative
    Draft {
        project: String,
        #[command(flatten)]
        watch: WatchArg,
    },
    /// Generate an illustration for one chapter
    Image {
        project: String,
        /// Chapter id or 1-based position
        chapter: String,
        #[command(flatten)]
        watch: WatchArg,
    },
    /// Generate illustrations for every unlocked chapter
    Images {
        project: String,
        #[command(flatten)]
        watch: WatchArg,
    },
    /// Render the book to PDF
    Pdf {
        project: String,
        #[command(flatten)]
        watch: WatchArg,
        /// Save the PDF here once it is ready (implies --watch)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download the rendered PDF
    Download {
        project: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download the book as a Word document
    Docx {
        project: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Curate chapters
    Chapters {
        #[command(subcommand)]
        command: ChaptersCommand,
    },
    /// Set the book cover title and subtitle
    Cover {
        project: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
    },
    /// Follow live progress for a project
    Watch {
        project: String,
        /// Exit once the running job finishes
        #[arg(long, default_value_t = false)]
        until_idle: bool,
    },
    /// Stream an audio file over the push channel for live transcription
    StreamAudio {
        project: String,
        audio: PathBuf,
        /// Bytes per chunk
        #[arg(long, default_value_t = 16 * 1024)]
        chunk_size: usize,
        /// Milliseconds between chunks
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// List your projects, newest first
    List,
    /// Start a new project
    Create {
        /// Defaults to "Untitled Story"
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "audio")]
        input_type: InputType,
    },
    /// Show one project with its chapters
    Show { project: String },
    /// Delete a project
    Delete {
        project: String,
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChaptersCommand {
    /// Change a chapter's title and/or body
    Edit {
        project: String,
        chapter: String,
        #[arg(long)]
        title: Option<String>,
        /// File holding the new body text
        #[arg(long)]
        content_file: Option<PathBuf>,
    },
    /// Protect a chapter from edits and regeneration
    Lock { project: String, chapter: String },
    Unlock { project: String, chapter: String },
    Delete { project: String, chapter: String },
    /// Move a chapter to a 1-based position
    Move {
        project: String,
        chapter: String,
        position: usize,
    },
    /// Upload and attach your own illustration
    AttachImage {
        project: String,
        chapter: String,
        image: PathBuf,
    },
    ClearImage { project: String, chapter: String },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct WatchArg {
    /// Follow progress until the job finishes
    #[arg(short, long, default_value_t = false)]
    pub watch: bool,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct JobArgs {
    /// Stop after transcription instead of drafting chapters
    #[arg(long, default_value_t = false)]
    pub no_auto_draft: bool,
    #[command(flatten)]
    pub watch: WatchArg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "vansh",
            "projects",
            "list",
            "--api-url",
            "http://api.test",
            "--json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://api.test"));
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Projects {
                command: ProjectsCommand::List
            }
        ));
    }

    #[test]
    fn job_flags_parse() {
        let cli = Cli::try_parse_from([
            "vansh",
            "transcribe",
            "p1",
            "memo.m4a",
            "--no-auto-draft",
            "--watch",
        ])
        .unwrap();
        match cli.command {
            Command::Transcribe { project, audio, job } => {
                assert_eq!(project, "p1");
                assert_eq!(audio, PathBuf::from("memo.m4a"));
                assert!(job.no_auto_draft);
                assert!(job.watch.watch);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_and_file_are_exclusive() {
        assert!(
            Cli::try_parse_from(["vansh", "text", "p1", "hello", "--file", "story.txt"]).is_err()
        );
    }

    #[test]
    fn conflict_policy_and_input_type_parse() {
        let cli = Cli::try_parse_from([
            "vansh",
            "--conflict-policy",
            "reject-stale",
            "projects",
            "create",
            "--input-type",
            "text",
        ])
        .unwrap();
        assert_eq!(cli.conflict_policy, Some(ConflictPolicy::RejectStale));
        match cli.command {
            Command::Projects {
                command: ProjectsCommand::Create { title, input_type },
            } => {
                assert!(title.is_none());
                assert_eq!(input_type, InputType::Text);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["vansh", "projects", "create", "--input-type", "vhs"]).is_err());
    }
}
