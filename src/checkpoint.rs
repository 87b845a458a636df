//! JSON checkpoints in a model directory.
//!
//! Each save writes `model.ckpt-<step>.json` and rewrites the `checkpoint`
//! index, which lists retained checkpoints oldest first.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::ParamState;
use crate::optim::Adam;

pub const INDEX_FILE: &str = "checkpoint";

/// Full training state at a global step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub global_step: u64,
    pub model: String,
    pub optimizer: Adam,
    pub params: Vec<ParamState>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckpointIndex {
    pub latest: Option<String>,
    pub all: Vec<String>,
}

pub fn checkpoint_name(step: u64) -> String {
    format!("model.ckpt-{step}.json")
}

fn read_index(dir: &Path) -> Result<CheckpointIndex> {
    let path = dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(CheckpointIndex::default());
    }
    let txt = fs::read_to_string(&path)?;
    serde_json::from_str(&txt).map_err(|e| Error::Checkpoint {
        path,
        reason: format!("unreadable index: {e}"),
    })
}

/// Write `ckpt` into `dir` and prune all but the newest `keep_max`
/// checkpoints. `keep_max == 0` keeps everything.
pub fn save(dir: &Path, ckpt: &Checkpoint, keep_max: usize) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = checkpoint_name(ckpt.global_step);
    let path = dir.join(&name);
    fs::write(&path, serde_json::to_string(ckpt)?)?;

    let mut index = read_index(dir)?;
    index.all.retain(|n| n != &name);
    index.all.push(name.clone());
    if keep_max > 0 && index.all.len() > keep_max {
        let excess = index.all.len() - keep_max;
        for old in index.all.drain(..excess) {
            let old_path = dir.join(&old);
            if old_path.exists() {
                fs::remove_file(&old_path)?;
                debug!("Removed old checkpoint {}", old_path.display());
            }
        }
    }
    index.latest = Some(name);
    fs::write(dir.join(INDEX_FILE), serde_json::to_string_pretty(&index)?)?;
    info!("Saved checkpoint {}", path.display());
    Ok(path)
}

/// Path of the newest checkpoint recorded in `dir`, if any.
pub fn latest(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(read_index(dir)?.latest.map(|n| dir.join(n)))
}

pub fn load(path: &Path) -> Result<Checkpoint> {
    let txt = fs::read_to_string(path).map_err(|e| Error::Checkpoint {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&txt).map_err(|e| Error::Checkpoint {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ckpt(step: u64) -> Checkpoint {
        Checkpoint {
            global_step: step,
            model: "linear".into(),
            optimizer: Adam::with_lr(0.01),
            params: vec![ParamState {
                rows: 1,
                cols: 2,
                value: vec![step as f32, 0.0],
                m: vec![],
                v: vec![],
            }],
        }
    }

    #[test]
    fn empty_dir_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn keeps_newest_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        for step in [10, 20, 30, 40] {
            save(dir.path(), &ckpt(step), 2).unwrap();
        }
        assert!(!dir.path().join(checkpoint_name(10)).exists());
        assert!(!dir.path().join(checkpoint_name(20)).exists());
        assert!(dir.path().join(checkpoint_name(30)).exists());

        let path = latest(dir.path()).unwrap().unwrap();
        assert_eq!(path, dir.path().join("model.ckpt-40.json"));
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.global_step, 40);
        assert_eq!(loaded.params[0].value[0], 40.0);
    }

    #[test]
    fn corrupt_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "not json").unwrap();
        assert!(matches!(latest(dir.path()), Err(Error::Checkpoint { .. })));
    }
}
