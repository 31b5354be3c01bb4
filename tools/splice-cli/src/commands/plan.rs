//! Plan a job without running it.

use std::path::PathBuf;

use splice_common::config::SpliceConfig;
use splice_compose::OutputSettings;

pub fn run(config: &SpliceConfig, path: PathBuf) -> anyhow::Result<()> {
    let job = super::load_job(&path)?;
    let settings = job.settings(&OutputSettings::from_config(config)?)?;
    let plan = job.plan(&settings)?;

    tracing::info!(
        clips = plan.clips.len(),
        size = %plan.frame_size,
        codec = %plan.video_codec,
        "Job planned"
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
