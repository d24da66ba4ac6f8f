//! Checkpoint files: discovery, loading and atomic writes.
//!
//! A checkpoint is a plain-text file of whitespace-separated decimal integers
//! named `<prefix>n=<count><suffix>`, e.g. `output_n=2000.txt`. The file with
//! the largest count in the output directory is the latest one.
//!
//! The output directory is single-writer. Running two computations against
//! the same directory at once is not supported: nothing locks it, and both
//! runs would race on the same file names.

mod store;
mod writer;

pub use store::CheckpointStore;
pub use writer::CheckpointWriter;

use std::path::{Path, PathBuf};

/// A checkpoint on disk: how many values it holds and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub count: u64,
    pub path: PathBuf,
}

/// The `<prefix>n=<count><suffix>` file name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointNaming {
    prefix: String,
    suffix: String,
}

impl Default for CheckpointNaming {
    fn default() -> Self {
        Self::new("output_", ".txt")
    }
}

impl CheckpointNaming {
    const COUNT_MARKER: &'static str = "n=";

    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn file_name(&self, count: u64) -> String {
        format!(
            "{}{}{}{}",
            self.prefix,
            Self::COUNT_MARKER,
            count,
            self.suffix
        )
    }

    pub fn path_in(&self, dir: &Path, count: u64) -> PathBuf {
        dir.join(self.file_name(count))
    }

    /// Name for a report derived from the checkpoint of `count` values, e.g.
    /// `output_n=2000_positions.txt`. It never parses as a checkpoint.
    pub fn report_name(&self, count: u64, tag: &str) -> String {
        format!(
            "{}{}{}_{}{}",
            self.prefix,
            Self::COUNT_MARKER,
            count,
            tag,
            self.suffix
        )
    }

    /// Extracts the count from a checkpoint file name, `None` if the name does
    /// not follow the pattern.
    ///
    /// ```
    /// use adic_sequence::checkpoint::CheckpointNaming;
    /// let naming = CheckpointNaming::default();
    /// assert_eq!(naming.parse_count("output_n=2000.txt"), Some(2000));
    /// assert_eq!(naming.parse_count("output_n=2000.txt.partial"), None);
    /// ```
    pub fn parse_count(&self, file_name: &str) -> Option<u64> {
        let digits = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(Self::COUNT_MARKER)?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_the_pattern() {
        let naming = CheckpointNaming::new("lucas_", ".dat");
        assert_eq!(naming.file_name(42), "lucas_n=42.dat");
        assert_eq!(naming.parse_count("lucas_n=42.dat"), Some(42));
    }

    #[test]
    fn report_names_are_not_checkpoints() {
        let naming = CheckpointNaming::default();
        let name = naming.report_name(2000, "positions");
        assert_eq!(name, "output_n=2000_positions.txt");
        assert_eq!(naming.parse_count(&name), None);
    }

    #[test]
    fn rejects_names_outside_the_pattern() {
        let naming = CheckpointNaming::default();
        for name in [
            "output_n=.txt",
            "output_n=-3.txt",
            "output_n=+3.txt",
            "output_n=3a.txt",
            "output_n=3.txt.tmp",
            ".output_n=3.txt.partial",
            "other_n=3.txt",
            "output_n=99999999999999999999999.txt",
        ] {
            assert_eq!(naming.parse_count(name), None, "{name}");
        }
        assert_eq!(naming.parse_count("output_n=0.txt"), Some(0));
    }
}
