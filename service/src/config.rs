use crate::ScheduleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How lines are turned into tasks.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Batches of up to `max_batch_size` lines on the worker pool.
    #[default]
    Batched,
    /// One line at a time on the calling thread.
    Unbatched,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cpu_threads: usize,
    /// Ordinals of the accelerator devices to use.
    pub devices: Vec<u32>,
    pub threads_per_device: usize,
    pub max_batch_size: usize,
    pub mode: Mode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cpu_threads: 1,
            devices: Vec::new(),
            threads_per_device: 1,
            max_batch_size: 1,
            mode: Mode::Batched,
        }
    }
}

/// The compute resource a worker thread is bound to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Device {
    Cpu,
    Accelerator(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator(i) => write!(f, "device{i}"),
        }
    }
}

impl SchedulerConfig {
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.cpu_threads + self.threads_per_device * self.devices.len()
    }

    /// The device of every worker, CPU workers first.
    pub fn worker_devices(&self) -> Vec<Device> {
        let mut ans = vec![Device::Cpu; self.cpu_threads];
        for &d in &self.devices {
            ans.extend(std::iter::repeat(Device::Accelerator(d)).take(self.threads_per_device));
        }
        ans
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self.mode {
            Mode::Unbatched => Ok(()),
            Mode::Batched if self.max_batch_size == 0 => Err(ScheduleError::ZeroBatchSize),
            Mode::Batched if self.worker_count() == 0 => Err(ScheduleError::NoWorkers),
            Mode::Batched => Ok(()),
        }
    }
}

#[test]
fn test_workers() {
    let config = SchedulerConfig {
        cpu_threads: 2,
        devices: vec![0, 3],
        threads_per_device: 2,
        ..Default::default()
    };
    assert_eq!(config.worker_count(), 6);
    assert_eq!(
        config.worker_devices(),
        [
            Device::Cpu,
            Device::Cpu,
            Device::Accelerator(0),
            Device::Accelerator(0),
            Device::Accelerator(3),
            Device::Accelerator(3),
        ]
    );
    assert_eq!(Device::Accelerator(3).to_string(), "device3");
}

#[test]
fn test_validate() {
    let mut config = SchedulerConfig::default();
    assert_eq!(config.validate(), Ok(()));

    config.max_batch_size = 0;
    assert_eq!(config.validate(), Err(ScheduleError::ZeroBatchSize));
    config.mode = Mode::Unbatched;
    assert_eq!(config.validate(), Ok(()));

    config = SchedulerConfig {
        cpu_threads: 0,
        ..Default::default()
    };
    assert_eq!(config.validate(), Err(ScheduleError::NoWorkers));
    config.devices = vec![1];
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn test_serde() {
    let config: SchedulerConfig =
        serde_json::from_str(r#"{ "devices": [0, 1], "max_batch_size": 8 }"#).unwrap();
    assert_eq!(
        config,
        SchedulerConfig {
            devices: vec![0, 1],
            max_batch_size: 8,
            ..Default::default()
        }
    );
    let config: SchedulerConfig = serde_json::from_str(r#"{ "mode": "unbatched" }"#).unwrap();
    assert_eq!(config.mode, Mode::Unbatched);
    assert_eq!(config.cpu_threads, 1);
}
