// ============================================================
// Layer 4 — CIFAR-10 Reader
// ============================================================
// Reads the binary distribution of CIFAR-10
// (https://www.cs.toronto.edu/~kriz/cifar.html):
//
//   data_batch_1.bin .. data_batch_5.bin   → train split
//   test_batch.bin                         → test split
//
// Each file is a sequence of 3073-byte records:
//   [label: u8][R plane: 1024][G plane: 1024][B plane: 1024]
// i.e. pixels are already channel-major (CHW), 32x32.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::dataset::ImageItem;

pub const CIFAR_SIDE:     usize = 32;
pub const CIFAR_CHANNELS: usize = 3;
const RECORD_LEN: usize = 1 + CIFAR_CHANNELS * CIFAR_SIDE * CIFAR_SIDE;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CIFAR-10 file not found: '{0}' (expected the binary version, cifar-10-batches-bin)")]
    Missing(PathBuf),

    #[error("'{path}' has {len} bytes, not a multiple of the {RECORD_LEN}-byte record size")]
    Truncated { path: PathBuf, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    #[value(name = "train")]
    Train,
    #[value(name = "test")]
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test  => "test",
        }
    }

    fn files(self) -> Vec<String> {
        match self {
            Split::Train => (1..=5).map(|i| format!("data_batch_{i}.bin")).collect(),
            Split::Test  => vec!["test_batch.bin".to_string()],
        }
    }
}

/// Loads CIFAR-10 records from a directory.
pub struct Cifar10 {
    root: PathBuf,
}

impl Cifar10 {
    /// `dir` may point at the extracted `cifar-10-batches-bin` folder or at
    /// its parent.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir    = dir.as_ref();
        let nested = dir.join("cifar-10-batches-bin");
        let root   = if nested.is_dir() { nested } else { dir.to_path_buf() };
        Self { root }
    }

    pub fn load(&self, split: Split) -> Result<Vec<ImageItem>, DatasetError> {
        let mut items = Vec::new();
        for name in split.files() {
            let path = self.root.join(&name);
            if !path.is_file() {
                return Err(DatasetError::Missing(path));
            }
            let bytes = fs::read(&path)
                .map_err(|source| DatasetError::Io { path: path.clone(), source })?;
            items.extend(parse_records(&path, &bytes)?);
        }
        tracing::info!("Loaded {} CIFAR-10 {:?} images from '{}'", items.len(), split, self.root.display());
        Ok(items)
    }
}

fn parse_records(path: &Path, bytes: &[u8]) -> Result<Vec<ImageItem>, DatasetError> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(DatasetError::Truncated { path: path.to_path_buf(), len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(RECORD_LEN)
        .map(|record| ImageItem {
            pixels:   record[1..].to_vec(),
            channels: CIFAR_CHANNELS,
            height:   CIFAR_SIDE,
            width:    CIFAR_SIDE,
        })
        .collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut r = vec![label];
        r.extend(std::iter::repeat(fill).take(RECORD_LEN - 1));
        r
    }

    #[test]
    fn test_loads_test_split_from_nested_dir() {
        let tmp    = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("cifar-10-batches-bin");
        fs::create_dir_all(&nested).unwrap();
        let mut bytes = record(3, 10);
        bytes.extend(record(7, 200));
        fs::write(nested.join("test_batch.bin"), bytes).unwrap();

        let items = Cifar10::new(tmp.path()).load(Split::Test).unwrap();
        assert_eq!(items.len(), 2);
        // the label byte is not part of the image
        assert!(items[0].pixels.iter().all(|&p| p == 10));
        assert_eq!(items[1].pixels.len(), 3 * 32 * 32);
        assert!(items[1].pixels.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bytes = record(0, 0);
        bytes.pop();
        fs::write(tmp.path().join("test_batch.bin"), bytes).unwrap();

        let err = Cifar10::new(tmp.path()).load(Split::Test).unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { len, .. } if len == RECORD_LEN - 1));
    }

    #[test]
    fn test_missing_train_batch() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("data_batch_1.bin"), record(1, 1)).unwrap();
        let err = Cifar10::new(tmp.path()).load(Split::Train).unwrap_err();
        assert!(matches!(err, DatasetError::Missing(p) if p.ends_with("data_batch_2.bin")));
    }
}
