//! Shrinking of captured output before it is persisted.
//!
//! Plain text is cut to a character budget and then to a line budget. On request, text that
//! looks like an environment dump (the output of `env` or `export`) is canonicalized instead:
//! such dumps are dominated by host-specific variables that drown out real differences.

use regex::RegexSet;
use std::sync::LazyLock;

/// Default character budget for a single block of captured text.
pub const DEFAULT_MAX_CHARS: usize = 10_000;

/// Default line budget for a single block of captured text.
pub const DEFAULT_MAX_LINES: usize = 200;

/// Number of `PATH` entries kept when canonicalizing an environment dump.
const PATH_KEEP: usize = 5;

const CHARS_MARKER: &str = "... [truncated - exceeded chars limit] ...";
const LINES_MARKER: &str = "... [truncated - exceeded lines limit] ...";
const LS_COLORS_MASK: &str = "<LS_COLORS_MASKED>";

/// Variables dropped from environment dumps.
static MASKED_KEYS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^VSCODE_",
        r"^BUNDLED_DEBUGPY_",
        r"^PYDEVD_",
        r"^DBUS_",
        r"^SSH_AUTH_SOCK$",
        r"^GPG_AGENT_INFO$",
        r"^XDG_.*",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Limits applied to captured text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of characters kept.
    pub max_chars: usize,
    /// Maximum number of lines kept.
    pub max_lines: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

/// Cuts `text` to the character budget, then to the line budget, leaving a marker
/// wherever something was dropped.
pub fn truncate_text(text: &str, limits: Limits) -> String {
    let mut s = if text.chars().count() > limits.max_chars {
        let kept: String = text.chars().take(limits.max_chars).collect();
        std::format!("{kept}\n{CHARS_MARKER}\n")
    } else {
        text.to_owned()
    };

    let line_count = s.split_inclusive('\n').count();
    if line_count > limits.max_lines {
        let kept: String = s.split_inclusive('\n').take(limits.max_lines).collect();
        s = std::format!("{kept}\n{LINES_MARKER}\n");
    }

    s
}

/// Canonicalizes `text` if it looks like an environment dump, or truncates it otherwise.
///
/// Canonicalization keeps only `KEY=VALUE` lines, drops well-known host-specific keys,
/// masks `LS_COLORS`, shortens `PATH`, cuts long values and sorts by key.
pub fn canonicalize_env_text(text: &str, limits: Limits) -> String {
    if !is_env_like(text) {
        return truncate_text(text, limits);
    }

    let mut pairs: Vec<(&str, String)> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim(), v))
        .filter(|(k, _)| !MASKED_KEYS.is_match(k))
        .map(|(k, v)| (k, canonical_value(k, v, limits.max_chars)))
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines: Vec<String> = pairs.into_iter().map(|(k, v)| std::format!("{k}={v}")).collect();
    if lines.len() > limits.max_lines {
        lines.truncate(limits.max_lines);
        lines.push(LINES_MARKER.to_owned());
    }

    if lines.is_empty() {
        String::new()
    } else {
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn canonical_value(key: &str, value: &str, max_chars: usize) -> String {
    let value = match key {
        "LS_COLORS" | "LSCOLORS" => LS_COLORS_MASK.to_owned(),
        "PATH" => {
            let parts: Vec<_> = if value.is_empty() {
                vec![]
            } else {
                value.split(':').collect()
            };

            if parts.len() > PATH_KEEP {
                std::format!("{}:...", parts[..PATH_KEEP].join(":"))
            } else {
                value.to_owned()
            }
        }
        _ => value.to_owned(),
    };

    if value.chars().count() > max_chars {
        let kept: String = value.chars().take(max_chars).collect();
        std::format!("{kept}...")
    } else {
        value
    }
}

/// Text is env-like when at least half of its non-blank lines contain `=`.
fn is_env_like(text: &str) -> bool {
    let lines: Vec<_> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }

    let with_eq = lines.iter().filter(|l| l.contains('=')).count();
    with_eq >= std::cmp::max(1, lines.len() / 2)
}
