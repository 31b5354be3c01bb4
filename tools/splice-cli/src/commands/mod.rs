pub mod check;
pub mod plan;
pub mod simulate;

use std::path::Path;

use splice_compose::JobSpec;

/// Read and validate a job file.
pub fn load_job(path: &Path) -> anyhow::Result<JobSpec> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read job {}: {e}", path.display()))?;
    JobSpec::from_json(&json).map_err(|e| anyhow::anyhow!("Invalid job {}: {e}", path.display()))
}
