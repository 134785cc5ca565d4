//! Artifact harvesting.
//!
//! Retrieves the tar stream of a container subtree, keeps the members whose
//! paths match the configured glob patterns, and repackages them into a new
//! transport-encoded tar.

use std::io::{Cursor, Read};

use base64::Engine;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tar::{Archive, Builder};
use tunnel_core::config::WORK_ROOT;
use tunnel_core::protocol::DistConfig;

use crate::error::RunnerError;
use crate::runtime::{ContainerId, ContainerRuntime};

/// Selects and repackages build artifacts from an exited container.
pub struct ArchiveFilter<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> ArchiveFilter<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Harvest the artifacts selected by `dist`.
    ///
    /// Returns `None` when `dist.artifacts` is empty (no retrieval at all).
    /// Otherwise the result is always present: a base64 tar holding the
    /// matching members, empty when nothing matched.
    pub fn collect(
        &self,
        id: &ContainerId,
        dist: &DistConfig,
    ) -> Result<Option<String>, RunnerError> {
        if dist.artifacts.is_empty() {
            return Ok(None);
        }

        let patterns = build_patterns(&dist.base_path, &dist.artifacts)?;
        let retrieval_path = join_path(WORK_ROOT, &dist.base_path);

        let mut reader = self.runtime.get_archive(id, &retrieval_path)?;
        // Tar trailers validate only once the stream is complete; a partial
        // read is not a valid filter input, so drain fully first.
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| RunnerError::ArchiveRetrieval {
                path: retrieval_path.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(container = %id, path = %retrieval_path, bytes = raw.len(), "archive retrieved");

        let mut input = Archive::new(Cursor::new(raw));
        let mut output = Builder::new(Vec::new());
        let mut kept = 0usize;

        for entry in input.entries().map_err(RunnerError::ArchiveFormat)? {
            let mut entry = entry.map_err(RunnerError::ArchiveFormat)?;
            let path = entry
                .path()
                .map_err(RunnerError::ArchiveFormat)?
                .into_owned();
            if !patterns.is_match(&path) {
                continue;
            }
            let header = entry.header().clone();
            output
                .append(&header, &mut entry)
                .map_err(RunnerError::ArchiveFormat)?;
            kept += 1;
        }

        let bytes = output.into_inner().map_err(RunnerError::ArchiveFormat)?;
        tracing::debug!(container = %id, kept = kept, "artifacts repackaged");
        Ok(Some(base64::engine::general_purpose::STANDARD.encode(bytes)))
    }
}

/// Join path segments without doubling or dropping separators. An empty
/// `base` yields `rel` unchanged (and vice versa).
fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

/// Compile `artifacts`, each joined with `base_path`, into one matcher.
///
/// `literal_separator` keeps `*` within a single path segment: selecting
/// files in a subtree takes an explicit `dir/*.ext` or `**` pattern, never
/// implicit recursion. Matching is case-sensitive.
fn build_patterns(base_path: &str, artifacts: &[String]) -> Result<GlobSet, RunnerError> {
    let mut builder = GlobSetBuilder::new();
    for artifact in artifacts {
        let joined = join_path(base_path, artifact);
        let glob = GlobBuilder::new(&joined)
            .literal_separator(true)
            .build()
            .map_err(|e| RunnerError::ArtifactPattern {
                pattern: joined.clone(),
                source: e,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RunnerError::ArtifactPattern {
        pattern: artifacts.join(", "),
        source: e,
    })
}
