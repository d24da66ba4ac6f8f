use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use num_bigint::BigInt;
use tracing::{debug, info};

use super::{CheckpointMeta, CheckpointNaming, CheckpointWriter};
use crate::error::CheckpointError;
use crate::sequence::Sequence;

/// Read side of the checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    naming: CheckpointNaming,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, naming: CheckpointNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &CheckpointNaming {
        &self.naming
    }

    /// A writer targeting the same directory and naming pattern.
    pub fn writer(&self) -> CheckpointWriter {
        CheckpointWriter::new(self.dir.clone(), self.naming.clone())
    }

    /// Finds the checkpoint with the largest count.
    ///
    /// A missing directory holds no checkpoints. Among equal counts the entry
    /// listed last wins.
    pub fn locate_latest(&self) -> Result<Option<CheckpointMeta>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Checkpoint directory does not exist yet");
                return Ok(None);
            }
            Err(e) => return Err(CheckpointError::io(&self.dir, e)),
        };

        let mut latest: Option<CheckpointMeta> = None;
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.dir, e))?;
            let file_name = entry.file_name();
            let Some(count) = file_name.to_str().and_then(|n| self.naming.parse_count(n)) else {
                continue;
            };
            if latest.as_ref().map_or(true, |l| count >= l.count) {
                latest = Some(CheckpointMeta {
                    count,
                    path: entry.path(),
                });
            }
        }

        match &latest {
            Some(meta) => debug!(
                path = %meta.path.display(),
                count = meta.count,
                "Located latest checkpoint"
            ),
            None => debug!(dir = %self.dir.display(), "No checkpoint found"),
        }
        Ok(latest)
    }

    /// Parses a checkpoint into a sequence.
    pub fn load(&self, meta: &CheckpointMeta) -> Result<Sequence, CheckpointError> {
        let bytes = fs::read(&meta.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CheckpointError::Missing {
                path: meta.path.clone(),
            },
            _ => CheckpointError::io(&meta.path, e),
        })?;

        let sequence = parse_values(&meta.path, &bytes)?;
        info!(
            path = %meta.path.display(),
            count = sequence.len(),
            "Loaded checkpoint"
        );
        Ok(sequence)
    }

    /// Locates and loads the latest checkpoint, if there is one.
    pub fn load_latest(&self) -> Result<Option<(CheckpointMeta, Sequence)>, CheckpointError> {
        let Some(meta) = self.locate_latest()? else {
            return Ok(None);
        };
        let sequence = self.load(&meta)?;
        Ok(Some((meta, sequence)))
    }
}

/// Splits on ASCII whitespace and accepts only `[+-]?[0-9]+` tokens.
fn parse_values(path: &Path, bytes: &[u8]) -> Result<Sequence, CheckpointError> {
    bytes
        .split(u8::is_ascii_whitespace)
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(position, token)| {
            parse_integer(token).ok_or_else(|| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                position,
                token: String::from_utf8_lossy(token).into_owned(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Sequence::from)
}

fn parse_integer(token: &[u8]) -> Option<BigInt> {
    let digits = match token {
        [b'+' | b'-', rest @ ..] => rest,
        _ => token,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    BigInt::parse_bytes(token, 10)
}
