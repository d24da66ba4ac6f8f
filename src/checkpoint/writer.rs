use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{CheckpointMeta, CheckpointNaming};
use crate::error::CheckpointError;
use crate::sequence::Sequence;

// Checkpoints for long runs reach hundreds of megabytes.
const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

/// Write side of the checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    naming: CheckpointNaming,
}

impl CheckpointWriter {
    pub fn new(dir: impl Into<PathBuf>, naming: CheckpointNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    /// Writes `sequence` to `<prefix>n=<len><suffix>`.
    ///
    /// The content goes to a hidden staging file first and is renamed into
    /// place once flushed and synced, so a scan never sees a partial
    /// checkpoint. A checkpoint of the same length is replaced.
    pub fn write(&self, sequence: &Sequence) -> Result<CheckpointMeta, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;

        let count = sequence.len();
        let path = self.naming.path_in(&self.dir, count);
        let staging = self
            .dir
            .join(format!(".{}.partial", self.naming.file_name(count)));

        debug!(staging = %staging.display(), count, "Writing checkpoint");
        if let Err(e) = write_values(&staging, sequence) {
            let _ = fs::remove_file(&staging);
            return Err(CheckpointError::io(&staging, e));
        }

        fs::rename(&staging, &path).map_err(|e| CheckpointError::io(&path, e))?;

        info!(path = %path.display(), count, "Checkpoint written");
        Ok(CheckpointMeta { count, path })
    }
}

fn write_values(path: &Path, sequence: &Sequence) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    for (i, value) in sequence.values().iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{value}")?;
    }
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}
