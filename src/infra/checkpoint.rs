// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the live model and its EMA copy with Burn's
// named MessagePack recorder (full precision, gzip).
//
// What gets saved per run directory:
//   best.mpk.gz        — one record: { model, model_ema }
//   latest_step.json   — training step of that record
//   config.json        — run configuration, rebuilt by `eval`
//
// The record is overwritten on every save; `best` is the only
// checkpoint a run keeps.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Record, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::unet::{Unet, UnetRecord};

const CHECKPOINT_NAME: &str = "best";
const LATEST_STEP_FILE: &str = "latest_step.json";
const CONFIG_FILE: &str = "config.json";

type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub model:     UnetRecord<B>,
    pub model_ema: UnetRecord<B>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_NAME}.mpk.gz"))
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint_path().exists() && self.dir.join(LATEST_STEP_FILE).exists()
    }

    /// Write both models and point `latest_step.json` at `step`.
    pub fn save<B: Backend>(&self, model: &Unet<B>, model_ema: &Unet<B>, step: usize) -> Result<()> {
        let record = CheckpointRecord {
            model:     model.clone().into_record(),
            model_ema: model_ema.clone().into_record(),
        };
        let path = self.dir.join(CHECKPOINT_NAME);
        CheckpointRecorder::new()
            .record(record, path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join(LATEST_STEP_FILE), serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write {LATEST_STEP_FILE}"))?;

        tracing::info!("Saved checkpoint at step {} to '{}'", step, self.dir.display());
        Ok(())
    }

    /// Load weights into freshly built `model` / `model_ema` of the same
    /// architecture. Returns the models and the step they were saved at.
    pub fn load<B: Backend>(
        &self,
        model:     Unet<B>,
        model_ema: Unet<B>,
        device:    &B::Device,
    ) -> Result<(Unet<B>, Unet<B>, usize)> {
        let step = self.latest_step()?;
        let path = self.dir.join(CHECKPOINT_NAME);

        let record: CheckpointRecord<B> = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;

        tracing::info!("Loaded checkpoint from step {}", step);
        Ok((model.load_record(record.model), model_ema.load_record(record.model_ema), step))
    }

    pub fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_STEP_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<usize>(s.trim())?)
    }

    pub fn save_config<C: Serialize>(&self, cfg: &C) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<C: DeserializeOwned>(&self) -> Result<C> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'eval'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed run config '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::unet::tests::tiny_config;
    use burn::backend::NdArray;
    use serde::Deserialize;

    type TestBackend = NdArray;

    fn first_weight(model: &Unet<TestBackend>) -> Vec<f32> {
        model.final_conv.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_save_then_load_restores_both_models() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path().join("run")).unwrap();

        let model = tiny_config(3).init::<TestBackend>(&device);
        let ema   = tiny_config(3).init::<TestBackend>(&device);
        ckpt.save(&model, &ema, 1500).unwrap();
        assert!(ckpt.has_checkpoint());
        assert!(ckpt.checkpoint_path().exists());

        let fresh_model = tiny_config(3).init::<TestBackend>(&device);
        let fresh_ema   = tiny_config(3).init::<TestBackend>(&device);
        let (m, e, step) = ckpt.load(fresh_model, fresh_ema, &device).unwrap();

        assert_eq!(step, 1500);
        assert_eq!(first_weight(&m), first_weight(&model));
        assert_eq!(first_weight(&e), first_weight(&ema));
    }

    #[test]
    fn test_load_without_checkpoint_fails() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let model  = tiny_config(3).init::<TestBackend>(&device);
        assert!(!ckpt.has_checkpoint());
        assert!(ckpt.load(model.clone(), model, &device).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cfg {
        lr:   f64,
        name: String,
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = Cfg { lr: 2e-4, name: "run".into() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config::<Cfg>().unwrap(), cfg);
    }
}
