//! Case definitions.

/// Category label applied to 3-column rows whose kind cell is blank.
pub(crate) const UNCATEGORIZED_KIND: &str = "Uncategorized";

/// Category label applied to 2-column rows, which carry no kind cell at all.
pub(crate) const GENERATED_KIND: &str = "generated";

/// A single command to be executed identically under both shells.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Case {
    /// Identifier used for reporting. Not guaranteed to be unique across sources.
    pub id: u64,
    /// Category label.
    pub kind: String,
    /// The literal command text, with carriage returns removed and surrounding
    /// whitespace trimmed.
    pub text: String,
}

impl Case {
    /// Creates a new case, normalizing the command text.
    pub fn new(id: u64, kind: impl Into<String>, text: &str) -> Self {
        Self {
            id,
            kind: kind.into(),
            text: normalize_text(text),
        }
    }

    /// Returns the command text flattened to a single line and shortened to at most
    /// `max_chars` characters, for use in one-line status output.
    pub fn display_text(&self, max_chars: usize) -> String {
        let flattened = self.text.replace('\n', " ");
        let flattened = flattened.trim();

        if flattened.chars().count() > max_chars {
            let kept: String = flattened.chars().take(max_chars.saturating_sub(3)).collect();
            std::format!("{kept}...")
        } else {
            flattened.to_owned()
        }
    }
}

impl std::fmt::Display for Case {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}]", self.id, self.kind)
    }
}

/// Strips carriage returns and surrounding whitespace from command text.
pub(crate) fn normalize_text(text: &str) -> String {
    text.replace('\r', "").trim().to_owned()
}
