use std::{collections::HashMap, fs, path::Path};

use log::info;
use machine_learning::arch::TensorSpec;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use super::{Checkpoint, CheckpointStore};
use crate::{Result, TrainErr};

/// Persists checkpoints as `.safetensors` files of little endian `f32` tensors.
#[derive(Clone, Copy, Debug, Default)]
pub struct SafetensorsStore;

impl SafetensorsStore {
    pub fn new() -> Self {
        Self
    }
}

fn to_le_bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits().to_le()).collect()
}

fn from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytemuck::pod_collect_to_vec::<u8, u32>(bytes)
        .into_iter()
        .map(|bits| f32::from_bits(u32::from_le(bits)))
        .collect()
}

impl CheckpointStore for SafetensorsStore {
    fn save(&mut self, checkpoint: &Checkpoint, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let buffers: Vec<(&TensorSpec, Vec<u32>)> = checkpoint
            .tensors
            .iter()
            .map(|(spec, values)| (spec, to_le_bits(values)))
            .collect();

        let views = buffers
            .iter()
            .map(|(spec, bits)| -> Result<_> {
                let bytes = bytemuck::cast_slice::<u32, u8>(bits);
                let view = TensorView::new(Dtype::F32, spec.shape.clone(), bytes)?;
                Ok((spec.name.as_str(), view))
            })
            .collect::<Result<Vec<_>>>()?;

        let metadata: HashMap<String, String> = checkpoint.metadata.clone().into_iter().collect();
        let bytes = safetensors::serialize(views, &Some(metadata))?;
        fs::write(path, bytes)?;

        info!("saved checkpoint to {}", path.display());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Checkpoint> {
        let bytes = fs::read(path)?;

        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let metadata = header
            .metadata()
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let file = SafeTensors::deserialize(&bytes)?;
        let tensors = file
            .tensors()
            .into_iter()
            .map(|(name, view)| -> Result<_> {
                if view.dtype() != Dtype::F32 {
                    return Err(TrainErr::Checkpoint(format!(
                        "tensor {name} is {:?}, expected F32",
                        view.dtype()
                    )));
                }

                let spec = TensorSpec::new(name, view.shape().to_vec());
                Ok((spec, from_le_bytes(view.data())))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Checkpoint { tensors, metadata })
    }
}
