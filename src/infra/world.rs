// ============================================================
// Layer 6 — Device World
// ============================================================
// One worker per selected device. Rank 0 is the main worker: it owns
// the optimizer, the EMA copy, and writes every artifact.
//
//   scatter:  states[r] ──moved──► thread r on devices[r]
//   gather:   results come back in rank order (the all-gather)
//   barrier:  the scope join; no rank outlives a `run` call
//
// Reference: Rust Book §16 (Fearless Concurrency, scoped threads)

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};
use rand::{rngs::StdRng, SeedableRng};

/// Backends the CLI can run on, with how a GPU index maps to a device.
pub trait ComputeBackend: Backend {
    const NAME: &'static str;

    fn device_for(index: usize) -> Self::Device;

    fn devices_for(gpus: &[usize]) -> Vec<Self::Device> {
        gpus.iter().map(|&i| Self::device_for(i)).collect()
    }
}

impl ComputeBackend for Wgpu {
    const NAME: &'static str = "wgpu";

    fn device_for(index: usize) -> WgpuDevice {
        WgpuDevice::DiscreteGpu(index)
    }

    /// A lone GPU 0 is whatever adapter wgpu picks, so machines with only
    /// an integrated or virtual adapter still run.
    fn devices_for(gpus: &[usize]) -> Vec<WgpuDevice> {
        match gpus {
            [0] => vec![WgpuDevice::DefaultDevice],
            _   => gpus.iter().map(|&i| Self::device_for(i)).collect(),
        }
    }
}

impl ComputeBackend for NdArray {
    const NAME: &'static str = "ndarray";

    fn device_for(_index: usize) -> NdArrayDevice {
        NdArrayDevice::Cpu
    }
}

/// Parse a comma-separated device list such as `"0,1,3"`.
pub fn parse_gpus(list: &str) -> Result<Vec<usize>> {
    let gpus = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().with_context(|| format!("invalid GPU index '{s}' in '{list}'")))
        .collect::<Result<Vec<_>>>()?;
    if gpus.is_empty() {
        bail!("no GPU selected (got '{list}')");
    }
    Ok(gpus)
}

/// Seed tensor and host RNGs for one rank.
pub fn seed_everything<B: Backend>(seed: u64) -> StdRng {
    B::seed(seed);
    StdRng::seed_from_u64(seed)
}

#[derive(Debug, Clone)]
pub struct World<B: Backend> {
    devices: Vec<B::Device>,
}

impl<B: Backend> World<B> {
    pub fn new(devices: Vec<B::Device>) -> Result<Self> {
        if devices.is_empty() {
            bail!("a world needs at least one device");
        }
        Ok(Self { devices })
    }

    pub fn from_gpus(gpus: &[usize]) -> Result<Self>
    where
        B: ComputeBackend,
    {
        Self::new(B::devices_for(gpus))
    }

    pub fn size(&self) -> usize {
        self.devices.len()
    }

    pub fn is_distributed(&self) -> bool {
        self.size() > 1
    }

    pub fn main_device(&self) -> &B::Device {
        &self.devices[0]
    }

    pub fn devices(&self) -> &[B::Device] {
        &self.devices
    }

    /// Host RNGs for timestep sampling: rank `r` draws from `seed + r`.
    pub fn rank_rngs(&self, seed: u64) -> Vec<StdRng> {
        (0..self.size())
            .map(|rank| StdRng::seed_from_u64(seed.wrapping_add(rank as u64)))
            .collect()
    }

    /// Items each rank handles so that `size * per_rank(n) >= n`.
    pub fn per_rank(&self, n: usize) -> usize {
        n.div_ceil(self.size())
    }

    /// Run `f(rank, device, state)` on every rank, one thread each, and
    /// return the results in rank order. A single-device world runs inline.
    pub fn run<S, T, F>(&self, states: Vec<S>, f: F) -> Result<Vec<T>>
    where
        S: Send,
        T: Send,
        F: Fn(usize, &B::Device, S) -> Result<T> + Sync,
    {
        if states.len() != self.size() {
            bail!("expected {} per-rank states, got {}", self.size(), states.len());
        }
        if !self.is_distributed() {
            let mut results = Vec::with_capacity(1);
            for state in states {
                results.push(f(0, &self.devices[0], state)?);
            }
            return Ok(results);
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = states
                .into_iter()
                .zip(&self.devices)
                .enumerate()
                .map(|(rank, (state, device))| {
                    let f = &f;
                    scope.spawn(move || f(rank, device, state))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("worker for rank {rank} panicked"))?
                        .with_context(|| format!("rank {rank} failed"))
                })
                .collect()
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn test_parse_gpus() {
        assert_eq!(parse_gpus("0").unwrap(), vec![0]);
        assert_eq!(parse_gpus("0, 2,3").unwrap(), vec![0, 2, 3]);
        assert!(parse_gpus("").is_err());
        assert!(parse_gpus("0,x").is_err());
    }

    #[test]
    fn test_per_rank_rounds_up() {
        let world = World::<TestBackend>::from_gpus(&[0, 1, 2]).unwrap();
        assert_eq!(world.per_rank(256), 86);
        assert_eq!(world.per_rank(3), 1);
        assert!(world.is_distributed());
    }

    #[test]
    fn test_rank_rngs_differ_by_rank() {
        use rand::Rng;
        let world = World::<TestBackend>::from_gpus(&[0, 1]).unwrap();
        let mut rngs = world.rank_rngs(0);
        let a: u64 = rngs[0].gen();
        let b: u64 = rngs[1].gen();
        assert_ne!(a, b);
        assert_eq!(a, StdRng::seed_from_u64(0).gen::<u64>());

        let mut seeded = world.rank_rngs(5);
        assert_eq!(seeded[0].gen::<u64>(), StdRng::seed_from_u64(5).gen::<u64>());
        assert_eq!(seeded[1].gen::<u64>(), StdRng::seed_from_u64(6).gen::<u64>());
    }

    #[test]
    fn test_wgpu_single_gpu_uses_default_adapter() {
        assert_eq!(<Wgpu as ComputeBackend>::devices_for(&[0]), vec![WgpuDevice::DefaultDevice]);
        assert_eq!(<Wgpu as ComputeBackend>::devices_for(&[1]), vec![WgpuDevice::DiscreteGpu(1)]);
        assert_eq!(
            <Wgpu as ComputeBackend>::devices_for(&[0, 1]),
            vec![WgpuDevice::DiscreteGpu(0), WgpuDevice::DiscreteGpu(1)]
        );
    }

    #[test]
    fn test_run_gathers_in_rank_order() {
        let world  = World::<TestBackend>::from_gpus(&[0, 1, 2, 3]).unwrap();
        let states = vec![10, 20, 30, 40];
        let out = world.run(states, |rank, _device, s| Ok(s + rank)).unwrap();
        assert_eq!(out, vec![10, 21, 32, 43]);
    }

    #[test]
    fn test_run_reports_failing_rank() {
        let world = World::<TestBackend>::from_gpus(&[0, 1]).unwrap();
        let err = world
            .run(vec![(), ()], |rank, _, _| if rank == 1 { bail!("boom") } else { Ok(()) })
            .unwrap_err();
        assert!(format!("{err:#}").contains("rank 1"));
    }

    #[test]
    fn test_state_count_must_match() {
        let world = World::<TestBackend>::from_gpus(&[0]).unwrap();
        assert!(world.run(vec![1, 2], |_, _, s| Ok(s)).is_err());
    }
}
