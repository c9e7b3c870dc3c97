//! Raw per-stage tool output kept when `--debug` is on.
//!
//! These files are product artifacts for post-mortems and are independent of
//! `RUST_LOG` diagnostics.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::Stage;

#[derive(Debug, Clone)]
pub struct DebugLog {
    dir: PathBuf,
    run_id: String,
}

impl DebugLog {
    pub fn new(dir: impl Into<PathBuf>, run_id: &str) -> Self {
        Self {
            dir: dir.into(),
            run_id: run_id.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one raw tool output as `<run_id>/<seq>-<stage>[-<label>].txt`.
    pub fn record(&self, seq: usize, stage: Stage, label: Option<&str>, output: &str) -> Result<PathBuf> {
        let run_dir = self.dir.join(&self.run_id);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("create debug dir {}", run_dir.display()))?;
        let name = match label {
            Some(label) => format!("{seq:03}-{stage}-{label}.txt"),
            None => format!("{seq:03}-{stage}.txt"),
        };
        let path = run_dir.join(name);
        fs::write(&path, output).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Path a streaming tool mirrors its raw stdout into.
    pub fn stream_path(&self, seq: usize, stage: Stage) -> PathBuf {
        self.dir
            .join(&self.run_id)
            .join(format!("{seq:03}-{stage}.stream.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_ordered_by_sequence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = DebugLog::new(temp.path(), "run1");
        let first = log.record(1, Stage::Brainstorm, None, "ideas").expect("record");
        let second = log
            .record(2, Stage::Fix, Some("item-3"), "patched")
            .expect("record");
        assert!(first.ends_with("run1/001-brainstorm.txt"));
        assert!(second.ends_with("run1/002-fix-item-3.txt"));
        assert_eq!(fs::read_to_string(second).expect("read"), "patched");
    }
}
