use std::time::{Duration, Instant};

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    /// Creates a new time sample.
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    /// Creates a system time source initialised to `Instant::now()`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let sample = TimeSample::new(elapsed.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    /// Constructs a fixed time source that always returns the provided time.
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Deterministic clock that advances by exactly one frame period per sample.
///
/// Used while the exporter captures so that the written sequence plays back at
/// its nominal rate no matter how long each frame took to render.
#[derive(Debug, Clone, Copy)]
pub struct FrameStepTimeSource {
    frame_rate: f32,
    frame: u64,
}

impl FrameStepTimeSource {
    pub fn new(frame_rate: f32) -> Self {
        Self {
            frame_rate: frame_rate.max(f32::EPSILON),
            frame: 0,
        }
    }
}

impl TimeSource for FrameStepTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let seconds = (self.frame as f64 / f64::from(self.frame_rate)) as f32;
        let sample = TimeSample::new(seconds, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Picks the clock that feeds `u_time`.
///
/// A frozen timestamp wins over everything; an active capture switches to the
/// frame-stepped clock; otherwise the wall clock drives the sketch.
pub fn time_source_for(frozen_time: Option<f32>, capture_rate: Option<f32>) -> BoxedTimeSource {
    match (frozen_time, capture_rate) {
        (Some(time), _) => Box::new(FixedTimeSource::new(time.max(0.0))),
        (None, Some(rate)) => Box::new(FrameStepTimeSource::new(rate)),
        (None, None) => Box::new(SystemTimeSource::new()),
    }
}

/// Paces redraws so the event loop does not render faster than requested.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Option<Duration>,
    next_frame: Option<Instant>,
}

/// Redraws this close to the deadline are issued immediately.
const DEADLINE_SLACK: Duration = Duration::from_micros(500);

impl FrameScheduler {
    pub fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
        Self {
            interval,
            next_frame: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match self.next_frame {
            Some(deadline) => now + DEADLINE_SLACK >= deadline,
            None => true,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_frame
    }

    /// Records a rendered frame and schedules the next one.
    ///
    /// Deadlines advance on a fixed cadence; when the loop falls more than one
    /// interval behind, the cadence restarts from `now` instead of bursting.
    pub fn mark_rendered(&mut self, now: Instant) {
        let Some(interval) = self.interval else {
            self.next_frame = None;
            return;
        };
        let next = match self.next_frame {
            Some(deadline) if now.saturating_duration_since(deadline) < interval => {
                deadline + interval
            }
            _ => now + interval,
        };
        self.next_frame = Some(next);
    }

    pub fn reset(&mut self) {
        self.next_frame = None;
    }
}

/// Frame-rate estimate averaged over one-second windows.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Counts one presented frame and returns the current estimate.
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Window title shown while the sketch runs.
pub fn fps_title(fps: f32) -> String {
    format!("FPS : {fps:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_step_source_advances_by_frame_period() {
        let mut source = FrameStepTimeSource::new(30.0);
        let first = source.sample();
        let second = source.sample();
        let third = source.sample();
        assert_eq!(first, TimeSample::new(0.0, 0));
        assert!((second.seconds - 1.0 / 30.0).abs() < 1e-6);
        assert!((third.seconds - 2.0 / 30.0).abs() < 1e-6);
        assert_eq!(third.frame_index, 2);

        source.reset();
        assert_eq!(source.sample().frame_index, 0);
    }

    #[test]
    fn system_source_never_goes_backwards() {
        let mut source = SystemTimeSource::new();
        let mut last = source.sample();
        for _ in 0..64 {
            let next = source.sample();
            assert!(next.seconds >= last.seconds);
            assert_eq!(next.frame_index, last.frame_index + 1);
            last = next;
        }
    }

    #[test]
    fn frozen_time_wins_over_capture_clock() {
        let mut source = time_source_for(Some(2.5), Some(30.0));
        assert_eq!(source.sample().seconds, 2.5);
        assert_eq!(source.sample().seconds, 2.5);

        let mut stepped = time_source_for(None, Some(10.0));
        stepped.sample();
        assert!((stepped.sample().seconds - 0.1).abs() < 1e-6);
    }

    #[test]
    fn scheduler_without_cap_is_always_ready() {
        let mut scheduler = FrameScheduler::new(None);
        let now = Instant::now();
        scheduler.mark_rendered(now);
        assert!(scheduler.ready_for_frame(now));
        assert!(scheduler.next_deadline().is_none());
        assert!(FrameScheduler::new(Some(0.0)).interval().is_none());
    }

    #[test]
    fn scheduler_keeps_a_fixed_cadence() {
        let mut scheduler = FrameScheduler::new(Some(50.0));
        let start = Instant::now();
        assert!(scheduler.ready_for_frame(start));

        scheduler.mark_rendered(start);
        let first = scheduler.next_deadline().expect("deadline");
        assert_eq!(first, start + Duration::from_millis(20));
        assert!(!scheduler.ready_for_frame(start + Duration::from_millis(10)));
        assert!(scheduler.ready_for_frame(first));

        // Rendering slightly late keeps the original cadence.
        scheduler.mark_rendered(first + Duration::from_millis(3));
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(40))
        );

        // Falling far behind restarts from the render time.
        let late = start + Duration::from_millis(200);
        scheduler.mark_rendered(late);
        assert_eq!(scheduler.next_deadline(), Some(late + Duration::from_millis(20)));
    }

    #[test]
    fn fps_counter_averages_over_one_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for frame in 1..30 {
            let fps = counter.tick(start + Duration::from_millis(frame * 33));
            assert_eq!(fps, 0.0);
        }
        let fps = counter.tick(start + Duration::from_secs(1));
        assert!((fps - 30.0).abs() < 0.01);
        assert_eq!(counter.fps(), fps);
    }

    #[test]
    fn title_shows_frame_rate() {
        assert_eq!(fps_title(59.94), "FPS : 59.94");
        assert_eq!(fps_title(0.0), "FPS : 0.00");
    }
}
