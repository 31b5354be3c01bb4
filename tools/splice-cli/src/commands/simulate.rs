//! Run a job through the in-process engine.

use std::path::PathBuf;

use splice_common::config::SpliceConfig;
use splice_compose::{Assembler, JobSpec, OutputSettings, Progress};
use splice_media_engine::{parse_codec_list, AudioCodec, MemoryEngine, VideoCodec};

pub async fn run(
    config: &SpliceConfig,
    path: Option<PathBuf>,
    video_encoders: Vec<String>,
    audio_encoders: Vec<String>,
) -> anyhow::Result<()> {
    let job = match &path {
        Some(path) => super::load_job(path)?,
        None => JobSpec::demo(),
    };
    let settings = job.settings(&OutputSettings::from_config(config)?)?;
    // Rejects undersized crops before anything is stored.
    let plan = job.plan(&settings)?;
    tracing::debug!(size = %plan.frame_size, "Job plan accepted");
    let engine = build_engine(&video_encoders, &audio_encoders)?;
    let clips = job.materialize(&engine, settings.pcm_chunk_frames)?;

    tracing::info!(
        job = path.as_ref().map_or("demo".to_string(), |p| p.display().to_string()),
        clips = clips.len(),
        container = %settings.container,
        "Starting simulation"
    );

    let result = Assembler::new(&engine, settings)
        .with_progress(Box::new(|progress: Progress| {
            tracing::debug!(
                percent = progress.percent,
                stage = ?progress.stage,
                clip = progress.clip_index,
                "Progress"
            );
        }))
        .compose(clips)
        .await;

    let ledger = engine.ledger();
    println!("Resources:");
    println!(
        "  Sources: {} opened, {} disposed",
        ledger.sources_opened, ledger.sources_disposed
    );
    println!(
        "  Samples: {} issued, {} released",
        ledger.samples_issued, ledger.samples_released
    );
    println!(
        "  Outputs: {} created, {} finalized, {} cancelled",
        ledger.outputs_created, ledger.outputs_finalized, ledger.outputs_cancelled
    );
    if !(ledger.sources_balanced() && ledger.samples_balanced() && ledger.outputs_settled()) {
        tracing::warn!(?ledger, "Engine resources were not all returned");
    }

    let report = result.map_err(|e| anyhow::anyhow!("Composition failed: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_engine(video: &[String], audio: &[String]) -> anyhow::Result<MemoryEngine> {
    let video: Vec<VideoCodec> = if video.is_empty() {
        VideoCodec::ALL.to_vec()
    } else {
        parse_codec_list(video)?
    };
    let audio: Vec<AudioCodec> = if audio.is_empty() {
        AudioCodec::ALL.to_vec()
    } else {
        parse_codec_list(audio)?
    };
    Ok(MemoryEngine::with_encoders(&video, &audio))
}
