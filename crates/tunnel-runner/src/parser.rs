//! Tagged-output parsing.
//!
//! The runner image brackets every reportable line with a channel tag
//! (`[out] ...`, `[err] ...`) and emits a `---` divider between command
//! output blocks. The parser only reads this convention; it never inserts
//! dividers itself.

use std::sync::OnceLock;

use regex::Regex;
use tunnel_core::protocol::CommandRecord;

/// Divider line the runner image emits between command output blocks.
const DIVIDER: &str = "---";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[([^\]]*)\] (.*)$").expect("tag pattern is valid"))
}

/// Parse combined container output into per-command records.
///
/// CRLF line endings are normalized first. Within each block, lines matching
/// `[tag] rest` are grouped by tag in emission order; untagged lines are
/// discarded silently. A block yielding no tagged line produces no record,
/// so the result length is at most the number of blocks. Never fails —
/// malformed input degrades to fewer or emptier records.
pub fn parse_output(output: &str) -> Vec<CommandRecord> {
    let normalized = output.replace("\r\n", "\n");
    let mut records = Vec::new();
    let mut current = CommandRecord::new();

    for line in normalized.split('\n') {
        if line == DIVIDER {
            let block = std::mem::take(&mut current);
            if !block.is_empty() {
                records.push(block);
            }
            continue;
        }
        if let Some(caps) = tag_pattern().captures(line) {
            current.push(&caps[1], &caps[2]);
        }
    }
    if !current.is_empty() {
        records.push(current);
    }

    records
}
