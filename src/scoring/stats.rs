//! Reference FID statistics on disk: a safetensors file holding
//! `mu` `[d]` and `sigma` `[d, d]` as f64.

use std::path::{Path, PathBuf};

use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use thiserror::Error;

use crate::scoring::score::FidStats;
use crate::scoring::weights::{decode_f64, WeightsError};

/// Stats file name for a dataset split, e.g. `cifar10.train.safetensors`.
pub fn stats_file_name(dataset: &str, split: &str) -> String {
    format!("{dataset}.{split}.safetensors")
}

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("cannot access stats file '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("stats file is missing '{0}'")]
    Missing(&'static str),

    #[error("bad stats tensor: {0}")]
    Decode(#[from] WeightsError),

    #[error("stats shapes disagree: mu {mu:?}, sigma {sigma:?}")]
    Shape { mu: Vec<usize>, sigma: Vec<usize> },
}

fn le_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn save_stats(path: &Path, stats: &FidStats) -> Result<(), StatsError> {
    let io = |source| StatsError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }

    let mu    = le_bytes(&stats.mu);
    let sigma = le_bytes(&stats.sigma);
    let views = vec![
        ("mu", TensorView::new(Dtype::F64, vec![stats.dim], &mu)?),
        ("sigma", TensorView::new(Dtype::F64, vec![stats.dim, stats.dim], &sigma)?),
    ];
    let bytes = safetensors::serialize(views, &None)?;
    std::fs::write(path, bytes).map_err(io)?;

    tracing::info!("Wrote FID statistics (dim {}) to '{}'", stats.dim, path.display());
    Ok(())
}

pub fn load_stats(path: &Path) -> Result<FidStats, StatsError> {
    let bytes = std::fs::read(path)
        .map_err(|source| StatsError::Io { path: path.to_path_buf(), source })?;
    let st = SafeTensors::deserialize(&bytes)?;

    let mu    = st.tensor("mu").map_err(|_| StatsError::Missing("mu"))?;
    let sigma = st.tensor("sigma").map_err(|_| StatsError::Missing("sigma"))?;

    let dim = mu.shape().first().copied().unwrap_or(0);
    if mu.shape().len() != 1 || sigma.shape() != [dim, dim] {
        return Err(StatsError::Shape { mu: mu.shape().to_vec(), sigma: sigma.shape().to_vec() });
    }

    Ok(FidStats {
        mu:    decode_f64("mu", &mu)?,
        sigma: decode_f64("sigma", &sigma)?,
        dim,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_keep_f64_precision() {
        let dir   = tempfile::tempdir().unwrap();
        let path  = dir.path().join("stats").join(stats_file_name("cifar10", "train"));
        let stats = FidStats { mu: vec![0.1, 1.0 / 3.0], sigma: vec![1.0, 1e-12, 1e-12, 2.0], dim: 2 };

        save_stats(&path, &stats).unwrap();
        assert!(path.ends_with("stats/cifar10.train.safetensors"));
        assert_eq!(load_stats(&path).unwrap(), stats);
    }

    #[test]
    fn test_missing_sigma() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        let mu   = le_bytes(&[0.0, 1.0]);
        let bytes = safetensors::serialize(
            vec![("mu", TensorView::new(Dtype::F64, vec![2], &mu).unwrap())],
            &None,
        )
        .unwrap();
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(load_stats(&path), Err(StatsError::Missing("sigma"))));
    }

    #[test]
    fn test_missing_file() {
        let err = load_stats(Path::new("/no/such/stats.safetensors")).unwrap_err();
        assert!(matches!(err, StatsError::Io { .. }));
    }
}
