//! Domain types for pfgap-io.

use std::collections::BTreeSet;

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where each row keeps its label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelColumn {
    /// The first field of the row.
    #[default]
    First,
    /// The last field of the row.
    Last,
    /// No label in the data file.
    None,
}

/// Layout of a delimited dataset file.
///
/// 1-D rows are `label,v0,v1,...`. 2-D rows split channels on the array
/// separator and entries on the entry separator: `label;v0,v1;w0,w1`.
///
/// # Defaults
///
/// | Parameter         | Default                        |
/// |-------------------|--------------------------------|
/// | `delimiter`       | `,`                            |
/// | `array_separator` | `;`                            |
/// | `has_header`      | `false`                        |
/// | `label_column`    | first                          |
/// | `two_d`           | `false`                        |
/// | `numeric`         | `true`                         |
/// | `missing_tokens`  | empty, `NA`, `N/A`, `NULL`, `NaN` |
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    delimiter: char,
    array_separator: char,
    has_header: bool,
    label_column: LabelColumn,
    two_d: bool,
    numeric: bool,
    missing_tokens: BTreeSet<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            array_separator: ';',
            has_header: false,
            label_column: LabelColumn::First,
            two_d: false,
            numeric: true,
            missing_tokens: ["", "NA", "N/A", "NULL", "NAN"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ReadOptions {
    /// Options with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Setters ---

    /// Set the field delimiter (1-D) or entry separator (2-D).
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the channel separator of 2-D rows.
    #[must_use]
    pub fn with_array_separator(mut self, separator: char) -> Self {
        self.array_separator = separator;
        self
    }

    /// Skip a header row.
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set where labels live.
    #[must_use]
    pub fn with_label_column(mut self, label_column: LabelColumn) -> Self {
        self.label_column = label_column;
        self
    }

    /// Read 2-D rows.
    #[must_use]
    pub fn with_two_d(mut self, two_d: bool) -> Self {
        self.two_d = two_d;
        self
    }

    /// Parse every value as a float (`true`) or keep categorical tokens.
    #[must_use]
    pub fn with_numeric(mut self, numeric: bool) -> Self {
        self.numeric = numeric;
        self
    }

    /// Replace the missing-value tokens; matching ignores case.
    #[must_use]
    pub fn with_missing_tokens<S: AsRef<str>>(mut self, tokens: impl IntoIterator<Item = S>) -> Self {
        self.missing_tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    // --- Getters ---

    /// Return the field delimiter.
    #[must_use]
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Return the channel separator.
    #[must_use]
    pub fn array_separator(&self) -> char {
        self.array_separator
    }

    /// Return whether a header row is skipped.
    #[must_use]
    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Return where labels live.
    #[must_use]
    pub fn label_column(&self) -> LabelColumn {
        self.label_column
    }

    /// Return whether rows are 2-D.
    #[must_use]
    pub fn two_d(&self) -> bool {
        self.two_d
    }

    /// Return whether values are numeric.
    #[must_use]
    pub fn numeric(&self) -> bool {
        self.numeric
    }

    /// Whether `token` marks a missing value.
    #[must_use]
    pub fn is_missing(&self, token: &str) -> bool {
        self.missing_tokens.contains(&token.trim().to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_name_valid() {
        let name = ExperimentName::new("my-experiment_01".to_string());
        assert!(name.is_ok());
        assert_eq!(name.unwrap().as_str(), "my-experiment_01");
    }

    #[test]
    fn experiment_name_rejects_empty() {
        let name = ExperimentName::new(String::new());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }

    #[test]
    fn experiment_name_rejects_special_chars() {
        let name = ExperimentName::new("my experiment!".to_string());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }

    #[test]
    fn missing_tokens_ignore_case() {
        let opts = ReadOptions::new();
        assert!(opts.is_missing("na"));
        assert!(opts.is_missing(" NaN "));
        assert!(opts.is_missing(""));
        assert!(!opts.is_missing("0"));

        let opts = opts.with_missing_tokens(["?"]);
        assert!(opts.is_missing("?"));
        assert!(!opts.is_missing("NA"));
    }
}
