//! Live transcription: an audio file is replayed over the push channel in
//! fixed-size chunks, the way a recorder would send it.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use vansh_core::validate::{self, MediaKind};
use vansh_core::{ClientMessage, Job};

use crate::commands::Ctx;
use crate::output;
use crate::watch::Watcher;

pub async fn stream_audio(
    ctx: &Ctx,
    project_id: &str,
    audio: &Path,
    chunk_size: usize,
    interval: Duration,
) -> Result<()> {
    let bytes = tokio::fs::read(audio)
        .await
        .with_context(|| format!("reading {}", audio.display()))?;
    validate::media_file(MediaKind::Audio, audio, bytes.len() as u64)?;

    let mut watcher = Watcher::connect(&ctx.api, &ctx.config, project_id, ctx.json).await?;
    let result = stream(&mut watcher, project_id, &bytes, chunk_size.max(1), interval).await;
    let transcript = watcher
        .projector()
        .project()
        .map(|p| p.transcript.clone())
        .unwrap_or_default();
    watcher.close().await;
    let chunks = result?;

    if ctx.json {
        return output::print_json(&json!({
            "project_id": project_id,
            "chunks": chunks,
            "transcript": transcript,
        }));
    }
    println!("{} Sent {chunks} chunks", output::ok("✓"));
    if transcript.is_empty() {
        println!("{}", output::dim("No transcript yet; the server may still be finishing."));
    } else {
        println!("{transcript}");
    }
    Ok(())
}

async fn stream(
    watcher: &mut Watcher,
    project_id: &str,
    bytes: &[u8],
    chunk_size: usize,
    interval: Duration,
) -> Result<usize> {
    watcher.begin(Job::Transcription);
    watcher.send(ClientMessage::StartTranscription {
        project_id: project_id.to_string(),
    });
    watcher.acknowledged("start_transcription").await?;

    let mut sent = 0;
    for chunk in bytes.chunks(chunk_size) {
        watcher.send(ClientMessage::AudioChunk(chunk.to_vec()));
        sent += 1;
        tokio::time::sleep(interval).await;
        watcher.pump().await?;
    }
    tracing::debug!(sent, "audio streamed");

    watcher.send(ClientMessage::StopTranscription {
        project_id: project_id.to_string(),
    });
    watcher.acknowledged("stop_transcription").await?;
    watcher.pump().await?;
    Ok(sent)
}
