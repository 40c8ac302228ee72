mod cli;
mod commands;
mod output;
mod stream;
mod watch;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vansh_client::{ApiClient, Config, Overrides, SessionContext, SessionStore};

use cli::{Cli, Command};
use commands::{Ctx, Submit};
use watch::{Until, Watcher};

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.no_color {
        owo_colors::set_override(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", output::err("error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(Overrides {
        api_url: cli.api_url,
        push_url: cli.push_url,
        session_file: cli.session_file,
        config_file: cli.config,
        conflict_policy: cli.conflict_policy,
    })?;
    tracing::debug!(api_url = %config.api_url, "configuration loaded");
    let session = SessionContext::hydrate(SessionStore::new(config.session_file.clone()));
    let api = ApiClient::new(&config, session)?;
    let ctx = Ctx {
        api,
        config,
        json: cli.json,
    };

    match cli.command {
        Command::Login { email, password } => commands::login(&ctx, &email, password).await,
        Command::Register {
            name,
            email,
            password,
        } => commands::register(&ctx, &name, &email, password).await,
        Command::Logout => commands::logout(&ctx),
        Command::Whoami => commands::whoami(&ctx).await,
        Command::Projects { command } => commands::projects(&ctx, command).await,
        Command::Text {
            project,
            text,
            file,
            job,
        } => {
            let text = commands::narrative(text, file).await?;
            commands::start_job(&ctx, &project, Submit::Text(text), job.watch.watch, !job.no_auto_draft)
                .await
                .map(drop)
        }
        Command::Transcribe {
            project,
            audio,
            job,
        } => commands::start_job(&ctx, &project, Submit::Audio(audio), job.watch.watch, !job.no_auto_draft)
            .await
            .map(drop),
        Command::UploadVideo {
            project,
            video,
            job,
        } => commands::start_job(&ctx, &project, Submit::Video(video), job.watch.watch, !job.no_auto_draft)
            .await
            .map(drop),
        Command::Draft { project, watch } => {
            commands::start_job(&ctx, &project, Submit::Draft, watch.watch, false)
                .await
                .map(drop)
        }
        Command::Image {
            project,
            chapter,
            watch,
        } => commands::image(&ctx, &project, &chapter, watch.watch).await,
        Command::Images { project, watch } => {
            commands::start_job(&ctx, &project, Submit::AllImages, watch.watch, false)
                .await
                .map(drop)
        }
        Command::Pdf {
            project,
            watch,
            output,
        } => commands::pdf(&ctx, &project, watch.watch, output).await,
        Command::Download { project, output } => commands::download(&ctx, &project, output).await,
        Command::Docx { project, output } => commands::docx(&ctx, &project, output).await,
        Command::Chapters { command } => commands::chapters(&ctx, command).await,
        Command::Cover {
            project,
            title,
            subtitle,
        } => commands::cover(&ctx, &project, title, subtitle).await,
        Command::Watch {
            project,
            until_idle,
        } => {
            let mut watcher = Watcher::connect(&ctx.api, &ctx.config, &project, ctx.json).await?;
            watcher.println(output::dim(format!("Watching {project}; Ctrl+C to stop")));
            let until = if until_idle { Until::AnyJobEnd } else { Until::Interrupted };
            let result = watcher.follow(until).await;
            watcher.close().await;
            result
        }
        Command::StreamAudio {
            project,
            audio,
            chunk_size,
            interval_ms,
        } => {
            stream::stream_audio(&ctx, &project, &audio, chunk_size, Duration::from_millis(interval_ms))
                .await
        }
    }
}
