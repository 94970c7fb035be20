mod memory;
mod safetensors;

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use machine_learning::arch::TensorSpec;

pub use self::{memory::MemoryStore, safetensors::SafetensorsStore};
use crate::{Result, TrainErr};

/// A snapshot of a model's parameters, split into its named tensors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Checkpoint {
    pub tensors: Vec<(TensorSpec, Vec<f32>)>,
    pub metadata: BTreeMap<String, String>,
}

impl Checkpoint {
    /// Splits a flat parameter buffer into the tensors of `layout`.
    ///
    /// # Returns
    /// An error if `layout` doesn't cover `params` exactly.
    pub fn from_params(params: &[f32], layout: &[TensorSpec]) -> Result<Self> {
        let expected: usize = layout.iter().map(TensorSpec::len).sum();
        if expected != params.len() {
            return Err(TrainErr::ShapeMismatch {
                what: "checkpoint parameters".into(),
                got: vec![params.len()],
                expected: vec![expected],
            });
        }

        let mut rest = params;
        let tensors = layout
            .iter()
            .map(|spec| {
                let (head, tail) = rest.split_at(spec.len());
                rest = tail;
                (spec.clone(), head.to_vec())
            })
            .collect();

        Ok(Self {
            tensors,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Flattens the checkpoint back into a parameter buffer ordered like `layout`.
    ///
    /// # Returns
    /// An error if a tensor of `layout` is missing or has a different shape.
    pub fn into_params(self, layout: &[TensorSpec]) -> Result<Vec<f32>> {
        let mut by_name: HashMap<String, (TensorSpec, Vec<f32>)> = self
            .tensors
            .into_iter()
            .map(|(spec, values)| (spec.name.clone(), (spec, values)))
            .collect();

        let mut params = Vec::with_capacity(layout.iter().map(TensorSpec::len).sum());

        for spec in layout {
            let (found, values) = by_name
                .remove(&spec.name)
                .ok_or_else(|| TrainErr::Checkpoint(format!("missing tensor {}", spec.name)))?;

            if found.shape != spec.shape || values.len() != spec.len() {
                return Err(TrainErr::ShapeMismatch {
                    what: format!("tensor {}", spec.name),
                    got: found.shape,
                    expected: spec.shape.clone(),
                });
            }

            params.extend(values);
        }

        if let Some(extra) = by_name.keys().next() {
            return Err(TrainErr::Checkpoint(format!("unexpected tensor {extra}")));
        }

        Ok(params)
    }

    pub fn epoch(&self) -> Option<usize> {
        self.metadata.get("epoch")?.parse().ok()
    }

    pub fn metric(&self) -> Option<f64> {
        self.metadata.get("metric")?.parse().ok()
    }
}

/// Where checkpoints are persisted to and reloaded from.
pub trait CheckpointStore {
    /// Persists `checkpoint` at `path`, replacing any previous one.
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<()>;

    /// Loads the checkpoint persisted at `path`.
    fn load(&self, path: &Path) -> Result<Checkpoint>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for &mut S {
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<()> {
        (**self).save(checkpoint, path)
    }

    fn load(&self, path: &Path) -> Result<Checkpoint> {
        (**self).load(path)
    }
}
