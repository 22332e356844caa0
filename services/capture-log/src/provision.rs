use crate::config::StorageConfig;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output directories, known to exist once returned from [`OutputDirs::provision`]
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub logs_dir: PathBuf,
    pub captures_dir: PathBuf,
}

impl OutputDirs {
    /// Create the log and capture directories (and missing parents).
    ///
    /// Safe to call when they already exist. Any failure here must stop
    /// startup; handlers assume both directories are present.
    pub fn provision(config: &StorageConfig) -> Result<Self> {
        ensure_dir(&config.logs_dir)?;
        ensure_dir(&config.captures_dir)?;

        Ok(Self {
            logs_dir: config.logs_dir.clone(),
            captures_dir: config.captures_dir.clone(),
        })
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create output directory {}", path.display()))?;

    if !path.is_dir() {
        bail!("Output path {} exists but is not a directory", path.display());
    }

    info!(path = %path.display(), "Output directory ready");
    Ok(())
}
