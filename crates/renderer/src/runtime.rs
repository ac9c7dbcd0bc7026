use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use heroconfig::LoadStrategy;
use shaderpack::{ShaderFetcher, ShaderLoadError, ShaderSet};
use tracing::warn;

use crate::error::EngineError;

/// Snapshot of the animation clock supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the clock started.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where animation time comes from.
pub trait TimeSource: Send {
    fn reset(&mut self);
    fn sample(&mut self, now: Instant) -> TimeSample;
}

/// Elapsed time since the first sample after construction or reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock {
    origin: Option<Instant>,
    frame: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSource for MonotonicClock {
    fn reset(&mut self) {
        self.origin = None;
        self.frame = 0;
    }

    fn sample(&mut self, now: Instant) -> TimeSample {
        let origin = *self.origin.get_or_insert(now);
        let sample = TimeSample::new(
            now.saturating_duration_since(origin).as_secs_f32(),
            self.frame,
        );
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Always reports the same timestamp; used for reduced motion.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self, _now: Instant) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

pub fn time_source_for(reduced_motion: bool) -> BoxedTimeSource {
    if reduced_motion {
        Box::new(FixedTimeSource::new(0.0))
    } else {
        Box::new(MonotonicClock::new())
    }
}

/// Tracks whether the host should keep requesting display refreshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameScheduler {
    active: bool,
    requested: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn wants_frame(&self) -> bool {
        self.active
    }

    pub fn mark_requested(&mut self) {
        self.requested = self.requested.saturating_add(1);
    }

    pub fn frames_requested(&self) -> u64 {
        self.requested
    }
}

/// Pending shader fetch, resolved either inline or on a worker thread.
pub(crate) enum ShaderFuture {
    Ready(Option<Result<ShaderSet, ShaderLoadError>>),
    Threaded {
        receiver: Receiver<Result<ShaderSet, ShaderLoadError>>,
    },
}

impl ShaderFuture {
    pub(crate) fn start(strategy: LoadStrategy, fetcher: Arc<dyn ShaderFetcher>) -> Self {
        match strategy {
            LoadStrategy::Immediate => {
                ShaderFuture::Ready(Some(shaderpack::load_from(fetcher.as_ref())))
            }
            LoadStrategy::Threaded => {
                let (sender, receiver) = mpsc::channel();
                let spawned = thread::Builder::new()
                    .name("heroglyph-shader-loader".into())
                    .spawn(move || {
                        let result = shaderpack::load_from(fetcher.as_ref());
                        let _ = sender.send(result);
                    });
                match spawned {
                    Ok(_) => ShaderFuture::Threaded { receiver },
                    Err(err) => {
                        warn!(error = %err, "failed to spawn shader loader thread");
                        ShaderFuture::Ready(None)
                    }
                }
            }
        }
    }

    /// `Ok(None)` while the worker is still busy.
    pub(crate) fn poll(&mut self) -> Result<Option<ShaderSet>, EngineError> {
        match self {
            ShaderFuture::Ready(slot) => match slot.take() {
                Some(result) => result.map(Some).map_err(EngineError::from),
                None => Err(EngineError::LoaderDisconnected),
            },
            ShaderFuture::Threaded { receiver } => match receiver.try_recv() {
                Ok(result) => result.map(Some).map_err(EngineError::from),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(EngineError::LoaderDisconnected),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn monotonic_clock_starts_at_first_sample() {
        let start = Instant::now();
        let mut clock = MonotonicClock::new();
        assert_eq!(clock.sample(start).seconds, 0.0);
        let later = clock.sample(start + Duration::from_millis(500));
        assert!((later.seconds - 0.5).abs() < 1e-6);
        assert_eq!(later.frame_index, 1);
        clock.reset();
        assert_eq!(clock.sample(start + Duration::from_secs(3)).seconds, 0.0);
    }

    #[test]
    fn reduced_motion_freezes_time() {
        let start = Instant::now();
        let mut source = time_source_for(true);
        source.sample(start);
        assert_eq!(source.sample(start + Duration::from_secs(10)).seconds, 0.0);
    }

    #[test]
    fn scheduler_toggles() {
        let mut scheduler = FrameScheduler::new();
        assert!(!scheduler.wants_frame());
        scheduler.start();
        assert!(scheduler.wants_frame());
        scheduler.cancel();
        assert!(!scheduler.wants_frame());
    }
}
