//! Pretrained weights read from `.safetensors` files into host memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use half::{bf16, f16};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeightsError {
    #[error("cannot read weights '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("Tensor not found: {0}")]
    TensorNotFound(String),

    #[error("Unsupported dtype for '{name}': {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },

    #[error("Shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name:     String,
        expected: Vec<usize>,
        actual:   Vec<usize>,
    },
}

/// A tensor decoded to little-endian `f32` on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    pub shape: Vec<usize>,
    pub data:  Vec<f32>,
}

impl HostTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }
}

/// Decode a safetensors view as `f64`, widening narrower float types.
pub fn decode_f64(name: &str, view: &TensorView<'_>) -> Result<Vec<f64>, WeightsError> {
    let bytes = view.data();
    let out = match view.dtype() {
        Dtype::F64 => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f64())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f64())
            .collect(),
        dtype => return Err(WeightsError::UnsupportedDtype { name: name.to_string(), dtype }),
    };
    Ok(out)
}

fn decode_f32(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>, WeightsError> {
    let bytes = view.data();
    let out = match view.dtype() {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        _ => decode_f64(name, view)?.into_iter().map(|v| v as f32).collect(),
    };
    Ok(out)
}

/// Every tensor of a safetensors file, decoded eagerly.
#[derive(Debug, Default)]
pub struct WeightStore {
    tensors: HashMap<String, HostTensor>,
}

impl WeightStore {
    pub fn open(path: &Path) -> Result<Self, WeightsError> {
        let bytes = std::fs::read(path)
            .map_err(|source| WeightsError::Io { path: path.to_path_buf(), source })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WeightsError> {
        let st = SafeTensors::deserialize(bytes)?;
        let mut tensors = HashMap::new();
        for (name, view) in st.tensors() {
            let data = decode_f32(&name, &view)?;
            tensors.insert(name, HostTensor::new(view.shape().to_vec(), data));
        }
        Ok(Self { tensors })
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: HostTensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&HostTensor, WeightsError> {
        self.tensors
            .get(name)
            .ok_or_else(|| WeightsError::TensorNotFound(name.to_string()))
    }

    pub fn get_shaped(&self, name: &str, expected: &[usize]) -> Result<&HostTensor, WeightsError> {
        let t = self.get(name)?;
        if t.shape != expected {
            return Err(WeightsError::ShapeMismatch {
                name:     name.to_string(),
                expected: expected.to_vec(),
                actual:   t.shape.clone(),
            });
        }
        Ok(t)
    }
}
