//! Wire types for the `run` RPC.
//!
//! These types are the shared "currency" between the stdio RPC layer and the
//! runner engine. They intentionally carry only what a remote caller needs —
//! not container internals.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ─── Request types ───────────────────────────────────────────────────────────

/// Artifact distribution config — which files to harvest after the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistConfig {
    /// Subtree root relative to the container work root (`""` = whole root).
    #[serde(default)]
    pub base_path: String,
    /// Glob patterns selecting files under `base_path`. Empty = no harvest.
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// A single `run` request: ordered commands plus optional source and dist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Commands to execute in order. A command may contain embedded newlines
    /// representing sequential sub-statements.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Base64-encoded tar archive unpacked into the work root before the
    /// container starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Artifact harvesting config.
    #[serde(default)]
    pub dist: DistConfig,
}

// ─── Response types ──────────────────────────────────────────────────────────

/// Tagged output lines of one command block, grouped by tag.
///
/// An explicit ordered-map-of-sequences: tags appear in first-emission order
/// and lines under a tag preserve emission order. Serializes as a JSON object
/// whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRecord {
    entries: Vec<(String, Vec<String>)>,
}

impl CommandRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` under `tag`, creating the tag on first use.
    pub fn push(&mut self, tag: &str, line: impl Into<String>) {
        match self.entries.iter_mut().find(|(t, _)| t == tag) {
            Some((_, lines)) => lines.push(line.into()),
            None => self.entries.push((tag.to_string(), vec![line.into()])),
        }
    }

    /// Lines recorded under `tag`, if any.
    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, lines)| lines.as_slice())
    }

    /// True when no tagged line was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate `(tag, lines)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(t, lines)| (t.as_str(), lines.as_slice()))
    }
}

impl Serialize for CommandRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (tag, lines) in &self.entries {
            map.serialize_entry(tag, lines)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CommandRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = CommandRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag names to arrays of lines")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((tag, lines)) = access.next_entry::<String, Vec<String>>()? {
                    entries.push((tag, lines));
                }
                Ok(CommandRecord { entries })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// The full `run` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResponse {
    /// One record per command block that produced tagged lines, in block
    /// order. Blocks with no tagged lines are dropped, so
    /// `results.len() <= commands.len()`.
    pub results: Vec<CommandRecord>,
    /// Base64-encoded tar of harvested artifacts. `null` when
    /// `dist.artifacts` was empty; a present-but-empty archive when patterns
    /// were given and nothing matched.
    pub output: Option<String>,
}
