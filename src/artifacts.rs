//! Temp artifact store.
//!
//! Every file a request puts on disk is an [`Artifact`]: a uniquely named
//! temp file with a kind-specific suffix so ffmpeg can infer the container
//! from the name. An artifact is a move-only owner of its file. It is
//! released exactly once, either explicitly with [`Artifact::release`] or
//! when the value is dropped, so every exit path of a request cleans up
//! without extra bookkeeping. Handing an artifact to the token registry
//! moves the obligation along with it.

use clipforge_common::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Logical role of an artifact in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The staged upload.
    Input,
    /// The conversion result.
    Output,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Lifecycle state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// Allocated, nothing written by a stage yet.
    Created,
    /// A stage is reading or writing it.
    InUse,
    /// The file has been deleted.
    Released,
}

/// Counts of artifacts created and released by a store.
///
/// `released` only counts files that are actually gone. A release whose
/// delete failed is counted in `leaked` and stays outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtifactStats {
    pub created: u64,
    pub released: u64,
    pub leaked: u64,
}

impl ArtifactStats {
    /// Artifacts whose file may still be on disk.
    pub fn outstanding(&self) -> u64 {
        self.created.saturating_sub(self.released)
    }
}

#[derive(Debug)]
struct StoreInner {
    root: PathBuf,
    input_suffix: String,
    output_suffix: String,
    created: AtomicU64,
    released: AtomicU64,
    leaked: AtomicU64,
}

/// Allocates artifacts under one root directory.
///
/// Cheap to clone; clones share the root and the counters.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// Relative roots are resolved against the current directory so that
    /// every artifact path is absolute.
    pub fn new(
        root: impl Into<PathBuf>,
        input_suffix: impl Into<String>,
        output_suffix: impl Into<String>,
    ) -> Result<Self> {
        let mut root = root.into();
        if root.is_relative() {
            root = std::env::current_dir()?.join(root);
        }
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::resource(format!("cannot create temp dir {}: {}", root.display(), e))
        })?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                input_suffix: input_suffix.into(),
                output_suffix: output_suffix.into(),
                created: AtomicU64::new(0),
                released: AtomicU64::new(0),
                leaked: AtomicU64::new(0),
            }),
        })
    }

    /// Create a store with the default `.mts` / `.mp4` suffixes.
    pub fn with_default_suffixes(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(root, ".mts", ".mp4")
    }

    /// Root directory holding this store's artifacts.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Allocate a new, empty artifact of the given kind.
    ///
    /// Name collisions are retried by `tempfile`; if allocation still fails
    /// the error is reported as [`Error::Resource`].
    pub fn create(&self, kind: ArtifactKind) -> Result<Artifact> {
        let suffix = match kind {
            ArtifactKind::Input => &self.inner.input_suffix,
            ArtifactKind::Output => &self.inner.output_suffix,
        };

        let path = tempfile::Builder::new()
            .prefix("clipforge-")
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.inner.root)
            .and_then(|file| file.into_temp_path().keep().map_err(|e| e.error))
            .map_err(|e| {
                Error::resource(format!(
                    "cannot allocate {} artifact in {}: {}",
                    kind,
                    self.inner.root.display(),
                    e
                ))
            })?;

        self.inner.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kind = %kind, path = %path.display(), "Artifact created");

        Ok(Artifact {
            path,
            display_name: None,
            kind,
            state: ArtifactState::Created,
            store: Arc::clone(&self.inner),
        })
    }

    /// Snapshot of created/released counts.
    pub fn stats(&self) -> ArtifactStats {
        ArtifactStats {
            created: self.inner.created.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
            leaked: self.inner.leaked.load(Ordering::SeqCst),
        }
    }
}

/// One on-disk pipeline file, owned by whichever stage holds the value.
pub struct Artifact {
    path: PathBuf,
    display_name: Option<String>,
    kind: ArtifactKind,
    state: ArtifactState,
    store: Arc<StoreInner>,
}

impl Artifact {
    /// Absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn state(&self) -> ArtifactState {
        self.state
    }

    /// Mark the artifact as being worked on by a stage.
    pub fn mark_in_use(&mut self) {
        if self.state == ArtifactState::Created {
            self.state = ArtifactState::InUse;
        }
    }

    /// File name of the backing file.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Attach the name the file should be presented under (e.g. as a download).
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Presentation name, falling back to the temp file name.
    pub fn display_name(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| self.file_name())
    }

    /// Delete the backing file now.
    pub fn release(mut self) {
        self.release_in_place();
    }

    fn release_in_place(&mut self) {
        if self.state == ArtifactState::Released {
            return;
        }
        self.state = ArtifactState::Released;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                self.store.released.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(kind = %self.kind, path = %self.path.display(), "Artifact released");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.store.released.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    kind = %self.kind,
                    path = %self.path.display(),
                    "Artifact already gone on release"
                );
            }
            Err(e) => {
                self.store.leaked.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    kind = %self.kind,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to delete artifact; file leaked"
                );
            }
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.release_in_place();
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("path", &self.path)
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}
