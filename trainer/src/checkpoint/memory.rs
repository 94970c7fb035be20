use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use super::{Checkpoint, CheckpointStore};
use crate::{Result, TrainErr};

/// Keeps checkpoints in memory, counting how many times one was saved.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    checkpoints: HashMap<PathBuf, Checkpoint>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the amount of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn get(&self, path: &Path) -> Option<&Checkpoint> {
        self.checkpoints.get(path)
    }
}

impl CheckpointStore for MemoryStore {
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<()> {
        self.checkpoints
            .insert(path.to_path_buf(), checkpoint.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Checkpoint> {
        self.checkpoints
            .get(path)
            .cloned()
            .ok_or_else(|| TrainErr::Checkpoint(format!("no checkpoint at {}", path.display())))
    }
}
