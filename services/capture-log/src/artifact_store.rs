use crate::error::IngestError;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

/// How many fresh ids a single write tries before giving up
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Allocates artifact ids on the epoch-millisecond scale.
///
/// Each id is at least the wall-clock millisecond it was requested at and
/// strictly greater than every id handed out before, so two writes landing in
/// the same millisecond still get distinct, ordered file names.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    last: AtomicU64,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for an artifact captured at `now`
    pub fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let candidate = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        candidate.max(previous + 1)
    }
}

/// File name and contents produced for one candidate id
#[derive(Debug, Clone)]
pub struct RenderedArtifact<'a> {
    pub file_name: String,
    pub contents: Cow<'a, [u8]>,
}

impl<'a> RenderedArtifact<'a> {
    pub fn new(file_name: String, contents: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            file_name,
            contents: contents.into(),
        }
    }
}

/// A file that was durably published into an artifact directory
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Artifact id the file name was derived from
    pub id: u64,
    /// Bare file name inside the directory
    pub file_name: String,
    /// Full path of the written file
    pub path: PathBuf,
    /// Bytes written
    pub size_bytes: usize,
}

/// One output directory plus the id allocator naming files inside it
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    namer: ArtifactNamer,
}

impl ArtifactStore {
    /// Create a store over an already provisioned directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            namer: ArtifactNamer::new(),
        }
    }

    /// Directory this store writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publish a brand new file whose name and contents `render` derives
    /// from a freshly allocated id.
    ///
    /// Contents go to a temp file in the same directory first and are then
    /// linked into place without replacing anything, so readers either see
    /// the complete file or nothing. A taken name costs one fresh id and a
    /// re-render.
    #[instrument(skip(self, render), fields(dir = %self.dir.display()))]
    pub fn write_new<'a, F>(
        &self,
        now: DateTime<Utc>,
        mut render: F,
    ) -> Result<StoredArtifact, IngestError>
    where
        F: FnMut(u64) -> Result<RenderedArtifact<'a>, IngestError>,
    {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let id = self.namer.next_id(now);
            let rendered = render(id)?;
            let path = self.dir.join(&rendered.file_name);

            let mut staged = NamedTempFile::new_in(&self.dir)?;
            staged.write_all(&rendered.contents)?;
            staged.as_file().sync_all()?;

            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    info!(
                        path = %path.display(),
                        size_bytes = rendered.contents.len(),
                        "Artifact written"
                    );
                    return Ok(StoredArtifact {
                        id,
                        size_bytes: rendered.contents.len(),
                        file_name: rendered.file_name,
                        path,
                    });
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(path = %path.display(), attempt, "Artifact name taken, allocating a new id");
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(IngestError::NamesExhausted {
            dir: self.dir.clone(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}
