//! Closed-loop frame-rate governor.
//!
//! The governor counts rendered frames, closes a measurement window roughly
//! once per second, and nudges a single quality scalar towards the frame-rate
//! target. Everything that sizes GPU work reads that scalar through
//! [`PerformanceGovernor::recommended_settings`].
//!
//! Types:
//!
//! - [`PerformanceGovernor`] owns the window counters and subscriber registry.
//! - [`PerformanceSample`] is the snapshot published after each window.
//! - [`RenderSettings`] is derived from a sample on demand, never stored.
//! - [`AdapterDescription`] is what a backend reports about its adapter.
//!
//! The governor never reads the clock itself; callers pass `Instant`s so
//! tests can drive it with synthetic time.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use heroconfig::GovernorSettings;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const MIN_QUALITY: f32 = 0.3;
pub const MAX_QUALITY: f32 = 1.0;
pub const DEGRADE_STEP: f32 = 0.1;
pub const RECOVER_STEP: f32 = 0.05;
pub const MAX_PARTICLES: u32 = 100;
pub const MAX_LINKS: u32 = 50;

const SUBSCRIPTION_DEPTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no graphics adapter available: {0}")]
    NoAdapter(String),
    #[error("adapter info unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    #[default]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterDescription {
    pub name: String,
    pub vendor: String,
    pub driver: String,
    pub class: DeviceClass,
}

impl AdapterDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the first configured signature found in any of the identity strings.
    pub fn matching_signature<'a>(&self, signatures: &'a [String]) -> Option<&'a str> {
        let haystacks = [
            self.name.to_ascii_lowercase(),
            self.vendor.to_ascii_lowercase(),
            self.driver.to_ascii_lowercase(),
        ];
        signatures
            .iter()
            .map(String::as_str)
            .find(|signature| {
                let needle = signature.to_ascii_lowercase();
                haystacks.iter().any(|hay| hay.contains(&needle))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub measured_fps: f32,
    pub target_fps: f32,
    pub quality: f32,
    pub is_low_end_device: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderSettings {
    pub pixel_ratio: f32,
    pub particle_count: u32,
    pub link_count: u32,
    pub enable_bloom: bool,
    pub enable_complex_shaders: bool,
}

impl RenderSettings {
    pub fn from_sample(sample: &PerformanceSample, device_pixel_ratio: f32, max_ratio: f32) -> Self {
        let quality = sample.quality.clamp(MIN_QUALITY, MAX_QUALITY);
        let ratio = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            pixel_ratio: ratio.min(max_ratio),
            particle_count: scaled_count(quality, MAX_PARTICLES),
            link_count: scaled_count(quality, MAX_LINKS),
            enable_bloom: !sample.is_low_end_device && quality > 0.7,
            enable_complex_shaders: quality > 0.5,
        }
    }
}

fn scaled_count(quality: f32, max: u32) -> u32 {
    // Guard against 0.29999 style products before flooring.
    ((quality * max as f32) + 1e-4).floor() as u32
}

fn snap(quality: f32) -> f32 {
    ((quality * 100.0).round() / 100.0).clamp(MIN_QUALITY, MAX_QUALITY)
}

#[derive(Debug)]
pub struct PerformanceSubscription {
    pub id: u64,
    pub receiver: Receiver<PerformanceSample>,
}

pub struct PerformanceGovernor {
    settings: GovernorSettings,
    sample: PerformanceSample,
    frames: u32,
    window_start: Instant,
    subscribers: Vec<(u64, Sender<PerformanceSample>)>,
    next_subscriber: u64,
}

impl PerformanceGovernor {
    pub fn new(settings: GovernorSettings, now: Instant) -> Self {
        let sample = PerformanceSample {
            measured_fps: 0.0,
            target_fps: settings.target_fps,
            quality: MAX_QUALITY,
            is_low_end_device: false,
        };
        Self {
            settings,
            sample,
            frames: 0,
            window_start: now,
            subscribers: Vec::new(),
            next_subscriber: 1,
        }
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.settings
    }

    /// Seeds quality and target from the adapter identity. A failed probe is
    /// treated as a low-end device.
    pub fn detect_capability(&mut self, probe: Result<AdapterDescription, ProbeError>) -> bool {
        let low_end = match probe {
            Ok(adapter) => {
                let signature = adapter.matching_signature(&self.settings.low_end_signatures);
                let low_end = signature.is_some() || adapter.class == DeviceClass::Cpu;
                info!(
                    adapter = %adapter.name,
                    vendor = %adapter.vendor,
                    signature = signature.unwrap_or("-"),
                    low_end,
                    "detected graphics adapter"
                );
                low_end
            }
            Err(err) => {
                warn!(error = %err, "capability probe failed; assuming low-end device");
                true
            }
        };

        self.sample.is_low_end_device = low_end;
        if low_end {
            self.sample.quality = snap(self.settings.low_end_quality);
            self.sample.target_fps = self.settings.low_end_target_fps;
        } else {
            self.sample.quality = MAX_QUALITY;
            self.sample.target_fps = self.settings.target_fps;
        }
        low_end
    }

    pub fn record_frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn frames_in_window(&self) -> u32 {
        self.frames
    }

    /// Closes the measurement window once it has elapsed, adjusts quality and
    /// publishes the new sample to every subscriber.
    pub fn tick(&mut self, now: Instant) -> Option<PerformanceSample> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.settings.window || elapsed.is_zero() {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let measured = (f64::from(self.frames) * 1000.0 / elapsed_ms) as f32;
        self.frames = 0;
        self.window_start = now;

        let previous = self.sample.quality;
        let target = self.sample.target_fps;
        if measured < target * 0.8 {
            self.sample.quality = snap((previous - DEGRADE_STEP).max(MIN_QUALITY));
        } else if measured > target * 0.95 && previous < MAX_QUALITY {
            self.sample.quality = snap((previous + RECOVER_STEP).min(MAX_QUALITY));
        }
        self.sample.measured_fps = measured;

        debug!(
            measured_fps = measured,
            target_fps = target,
            quality = self.sample.quality,
            previous_quality = previous,
            "performance window closed"
        );

        self.notify();
        Some(self.sample)
    }

    pub fn sample(&self) -> PerformanceSample {
        self.sample
    }

    pub fn quality(&self) -> f32 {
        self.sample.quality
    }

    pub fn is_low_end(&self) -> bool {
        self.sample.is_low_end_device
    }

    pub fn recommended_settings(&self, device_pixel_ratio: f32) -> RenderSettings {
        RenderSettings::from_sample(&self.sample, device_pixel_ratio, self.settings.max_pixel_ratio)
    }

    /// Restarts the window without touching quality, e.g. after a pause.
    pub fn reset_window(&mut self, now: Instant) {
        self.frames = 0;
        self.window_start = now;
    }

    pub fn window(&self) -> Duration {
        self.settings.window
    }

    pub fn subscribe(&mut self) -> PerformanceSubscription {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIPTION_DEPTH);
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.push((id, tx));
        PerformanceSubscription { id, receiver: rx }
    }

    pub fn unsubscribe(&mut self, id: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        before != self.subscribers.len()
    }

    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&mut self) {
        let sample = self.sample;
        self.subscribers.retain(|(id, tx)| match tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = id, "subscriber lagging; sample dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(now: Instant) -> PerformanceGovernor {
        PerformanceGovernor::new(GovernorSettings::default(), now)
    }

    fn run_window(gov: &mut PerformanceGovernor, now: &mut Instant, frames: u32) -> PerformanceSample {
        for _ in 0..frames {
            gov.record_frame();
        }
        *now += Duration::from_millis(1000);
        gov.tick(*now).expect("window closed")
    }

    #[test]
    fn high_end_adapter_starts_at_full_quality() {
        let mut gov = governor(Instant::now());
        let low = gov.detect_capability(Ok(AdapterDescription::new("NVIDIA GeForce RTX 4070")));
        assert!(!low);
        assert_eq!(gov.quality(), 1.0);
        assert_eq!(gov.sample().target_fps, 60.0);
    }

    #[test]
    fn low_end_signature_seeds_reduced_quality() {
        let mut gov = governor(Instant::now());
        let adapter = AdapterDescription {
            name: "Mali-400 MP".into(),
            ..AdapterDescription::default()
        };
        assert!(gov.detect_capability(Ok(adapter)));
        assert_eq!(gov.quality(), 0.5);
        assert_eq!(gov.sample().target_fps, 30.0);
    }

    #[test]
    fn cpu_adapter_and_failed_probe_are_low_end() {
        let mut gov = governor(Instant::now());
        let adapter = AdapterDescription {
            name: "Generic".into(),
            class: DeviceClass::Cpu,
            ..AdapterDescription::default()
        };
        assert!(gov.detect_capability(Ok(adapter)));

        let mut gov = governor(Instant::now());
        assert!(gov.detect_capability(Err(ProbeError::NoAdapter("none".into()))));
        assert!(gov.is_low_end());
    }

    #[test]
    fn tick_waits_for_full_window() {
        let start = Instant::now();
        let mut gov = governor(start);
        gov.record_frame();
        assert!(gov.tick(start + Duration::from_millis(999)).is_none());
        assert_eq!(gov.frames_in_window(), 1);
    }

    #[test]
    fn slow_window_degrades_by_tenth() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("Radeon RX 7800")));
        let sample = run_window(&mut gov, &mut now, 40);
        assert_eq!(sample.measured_fps, 40.0);
        assert!((sample.quality - 0.9).abs() < 1e-6);
        assert_eq!(gov.frames_in_window(), 0);
    }

    #[test]
    fn quality_floors_at_minimum() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("Radeon")));
        for _ in 0..20 {
            run_window(&mut gov, &mut now, 5);
        }
        assert_eq!(gov.quality(), MIN_QUALITY);
    }

    #[test]
    fn fast_windows_recover_to_exactly_one() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("PowerVR Rogue")));
        assert_eq!(gov.quality(), 0.5);
        for _ in 0..10 {
            run_window(&mut gov, &mut now, 60);
        }
        assert_eq!(gov.quality(), 1.0);
        let settings = gov.recommended_settings(1.0);
        assert_eq!(settings.particle_count, 100);
        assert_eq!(settings.link_count, 50);
    }

    #[test]
    fn each_fast_window_adds_one_recover_step() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("PowerVR Rogue")));
        let qualities: Vec<f32> = (0..2)
            .map(|_| run_window(&mut gov, &mut now, 30).quality)
            .collect();
        assert_eq!(qualities, vec![0.55, 0.6]);
    }

    #[test]
    fn recovery_clamps_at_full_quality() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("Radeon RX 7800")));
        assert_eq!(run_window(&mut gov, &mut now, 40).quality, 0.9);
        assert_eq!(run_window(&mut gov, &mut now, 60).quality, 0.95);
        assert_eq!(run_window(&mut gov, &mut now, 60).quality, 1.0);
        assert_eq!(run_window(&mut gov, &mut now, 60).quality, 1.0);
    }

    #[test]
    fn degrade_near_floor_stops_at_minimum() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("Mali-400 MP")));
        assert_eq!(run_window(&mut gov, &mut now, 10).quality, 0.4);
        assert_eq!(run_window(&mut gov, &mut now, 30).quality, 0.45);
        assert_eq!(run_window(&mut gov, &mut now, 10).quality, 0.35);
        assert_eq!(run_window(&mut gov, &mut now, 10).quality, MIN_QUALITY);
        assert_eq!(run_window(&mut gov, &mut now, 10).quality, MIN_QUALITY);
        assert_eq!(MIN_QUALITY, 0.3);
    }

    #[test]
    fn in_band_rate_holds_quality() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        gov.detect_capability(Ok(AdapterDescription::new("PowerVR")));
        let sample = run_window(&mut gov, &mut now, 27);
        assert_eq!(sample.quality, 0.5);
    }

    #[test]
    fn settings_follow_quality() {
        let sample = PerformanceSample {
            measured_fps: 60.0,
            target_fps: 60.0,
            quality: 0.7,
            is_low_end_device: false,
        };
        let settings = RenderSettings::from_sample(&sample, 3.0, 1.5);
        assert_eq!(settings.pixel_ratio, 1.5);
        assert_eq!(settings.particle_count, 70);
        assert_eq!(settings.link_count, 35);
        assert!(!settings.enable_bloom, "bloom needs quality above 0.7");
        assert!(settings.enable_complex_shaders);
    }

    #[test]
    fn counts_are_monotone_in_quality() {
        let mut previous = (0, 0);
        for step in 30..=100 {
            let sample = PerformanceSample {
                measured_fps: 0.0,
                target_fps: 60.0,
                quality: step as f32 / 100.0,
                is_low_end_device: true,
            };
            let settings = RenderSettings::from_sample(&sample, 1.0, 1.5);
            assert!(settings.particle_count >= previous.0);
            assert!(settings.link_count >= previous.1);
            assert!(!settings.enable_bloom);
            previous = (settings.particle_count, settings.link_count);
        }
        assert_eq!(previous, (100, 50));
    }

    #[test]
    fn subscribers_receive_samples_and_are_pruned() {
        let mut now = Instant::now();
        let mut gov = governor(now);
        let keep = gov.subscribe();
        let dropped = gov.subscribe();
        assert_eq!(gov.subscriber_count(), 2);
        drop(dropped);

        let sample = run_window(&mut gov, &mut now, 60);
        assert_eq!(keep.receiver.try_recv().unwrap(), sample);
        assert_eq!(gov.subscriber_count(), 1);

        assert!(gov.unsubscribe(keep.id));
        assert!(!gov.unsubscribe(keep.id));
        assert_eq!(gov.subscriber_count(), 0);
    }
}
