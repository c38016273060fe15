//! CPU usage publisher.
//!
//! Usage is computed by the OS from the delta between two refreshes, so the
//! first reading after start is meaningless. `warm_up` takes that reading and
//! discards it; the first published value covers the whole first interval.

use std::time::Duration;

use sysinfo::System;

use super::Publisher;

/// Source of global CPU usage readings, in percent.
pub trait CpuSampler: Send + 'static {
    fn sample(&mut self) -> f32;
}

pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for SysinfoSampler {
    fn sample(&mut self) -> f32 {
        self.system.refresh_cpu_usage();
        self.system.global_cpu_usage()
    }
}

/// Publishes `CPU: <percent>%` to every open connection. Deliberately not
/// gated by a topic, unlike [`super::TimePublisher`].
pub struct CpuPublisher<S = SysinfoSampler> {
    sampler: S,
    interval: Duration,
}

impl CpuPublisher<SysinfoSampler> {
    pub fn new(interval: Duration) -> Self {
        Self::with_sampler(SysinfoSampler::new(), interval)
    }
}

impl<S: CpuSampler> CpuPublisher<S> {
    pub fn with_sampler(sampler: S, interval: Duration) -> Self {
        Self { sampler, interval }
    }
}

impl<S: CpuSampler> Publisher for CpuPublisher<S> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn topic(&self) -> Option<&str> {
        None
    }

    fn warm_up(&mut self) {
        let _ = self.sampler.sample();
    }

    fn next_message(&mut self) -> String {
        format_usage(self.sampler.sample())
    }
}

pub fn format_usage(usage: f32) -> String {
    let usage = if usage.is_finite() {
        usage.clamp(0.0, 100.0)
    } else {
        0.0
    };
    format!("CPU: {usage:.2}%")
}
