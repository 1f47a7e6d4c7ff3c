use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, TryRecvError},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    anchors::Anchor,
    animation::{FlameField, SpreadModel},
    config::AppConfig,
    flame::FlameFactory,
    render::{PointSink, PointStyle},
    signal::{SignalLevel, SignalPipeline},
};

/// Supplies the elapsed time for each frame.
pub trait TimeSource {
    /// Seconds since the clock started, sampled once per frame.
    fn now(&mut self) -> f32;

    /// Whether frames should be paced against the wall clock.
    fn is_realtime(&self) -> bool {
        true
    }
}

/// Monotonic wall clock.
#[derive(Debug, Clone)]
pub struct FrameClock {
    started: Instant,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::start()
    }
}

impl TimeSource for FrameClock {
    fn now(&mut self) -> f32 {
        self.elapsed().as_secs_f32()
    }
}

/// Deterministic clock that moves by a fixed step per frame.
#[derive(Debug, Default, Clone)]
pub struct FixedStepClock {
    pub time_seconds: f32,
    pub step: f32,
}

impl FixedStepClock {
    pub fn new(step: f32) -> Self {
        Self {
            time_seconds: 0.0,
            step,
        }
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

impl TimeSource for FixedStepClock {
    fn now(&mut self) -> f32 {
        let now = self.time_seconds;
        self.advance(self.step);
        now
    }

    fn is_realtime(&self) -> bool {
        false
    }
}

/// Cloneable cancellation flag shared by every long-running loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Sending half used by the model loader to deliver anchors.
#[derive(Debug, Clone)]
pub struct AnchorSender {
    tx: mpsc::Sender<Vec<Anchor>>,
}

impl AnchorSender {
    /// Returns `false` if the frame loop is gone.
    pub fn send(&self, anchors: Vec<Anchor>) -> bool {
        self.tx.send(anchors).is_ok()
    }
}

/// Receiving half polled by [`FrameLoop`] once per frame.
#[derive(Debug)]
pub struct AnchorInbox {
    rx: mpsc::Receiver<Vec<Anchor>>,
}

impl AnchorInbox {
    pub fn channel() -> (AnchorSender, AnchorInbox) {
        let (tx, rx) = mpsc::channel();
        (AnchorSender { tx }, AnchorInbox { rx })
    }

    fn poll(&self) -> InboxPoll {
        match self.rx.try_recv() {
            Ok(anchors) => InboxPoll::Ready(anchors),
            Err(TryRecvError::Empty) => InboxPoll::Pending,
            Err(TryRecvError::Disconnected) => InboxPoll::Closed,
        }
    }
}

enum InboxPoll {
    Ready(Vec<Anchor>),
    Pending,
    Closed,
}

/// Render-loop driver.
///
/// Each tick samples the signal (when the pipeline runs inline), spawns
/// groups for newly delivered anchors, advances every particle into the sink
/// and presents. Nothing in a tick can abort the loop.
#[derive(Debug)]
pub struct FrameLoop {
    level: SignalLevel,
    pipeline: Option<SignalPipeline>,
    inbox: Option<AnchorInbox>,
    factory: FlameFactory,
    field: FlameField,
    frame_interval: Duration,
    frames: u64,
}

impl FrameLoop {
    /// Builds a loop that reads `level` but does not sample it. Use
    /// [`with_pipeline`](Self::with_pipeline) to sample inline.
    pub fn new(config: &AppConfig, level: SignalLevel, inbox: AnchorInbox) -> Self {
        Self {
            level,
            pipeline: None,
            inbox: Some(inbox),
            factory: FlameFactory::new(config.flames.clone()),
            field: FlameField::new(SpreadModel::new(&config.animation)),
            frame_interval: config.frame.frame_interval(),
            frames: 0,
        }
    }

    /// Samples `pipeline` at the start of every tick and reads its level.
    pub fn with_pipeline(mut self, pipeline: SignalPipeline) -> Self {
        self.level = pipeline.level();
        self.pipeline = Some(pipeline);
        self
    }

    pub fn field(&self) -> &FlameField {
        &self.field
    }

    pub fn level(&self) -> &SignalLevel {
        &self.level
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn tick(&mut self, elapsed: f32, sink: &mut dyn PointSink) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.sample();
        }
        self.receive_anchors(sink);

        self.field.advance_all(elapsed, self.level.get(), sink);
        if let Err(err) = sink.present() {
            tracing::warn!(frame = self.frames, error = %err, "failed to present frame");
        }
        self.frames += 1;
    }

    /// Ticks until `shutdown` is cancelled or `max_frames` frames have been
    /// rendered. Returns the number of frames rendered by this call.
    pub fn run(
        &mut self,
        clock: &mut dyn TimeSource,
        sink: &mut dyn PointSink,
        shutdown: &ShutdownSignal,
        max_frames: Option<u64>,
    ) -> u64 {
        let first = self.frames;
        while !shutdown.is_cancelled() {
            if max_frames.is_some_and(|max| self.frames - first >= max) {
                break;
            }

            let frame_start = Instant::now();
            let elapsed = clock.now();
            self.tick(elapsed, sink);

            if clock.is_realtime() {
                if let Some(rest) = self.frame_interval.checked_sub(frame_start.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }
        self.frames - first
    }

    fn receive_anchors(&mut self, sink: &mut dyn PointSink) {
        let Some(inbox) = self.inbox.as_ref() else {
            return;
        };

        loop {
            match inbox.poll() {
                InboxPoll::Ready(anchors) => {
                    let groups = self.field.spawn(&mut self.factory, &anchors);
                    tracing::info!(
                        frame = self.frames,
                        groups,
                        particles = self.field.len(),
                        "spawned flame groups"
                    );
                    let styles: Vec<PointStyle> =
                        self.field.particles().map(|p| p.style().clone()).collect();
                    sink.reset(&styles);
                }
                InboxPoll::Pending => return,
                InboxPoll::Closed => {
                    tracing::debug!("anchor source closed");
                    self.inbox = None;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anchors::AnchorExtractor,
        config::SignalConfig,
        render::PointCloud,
        signal::SpectrumSource,
        FlameVizError, Result,
    };
    use glam::Vec3;

    fn seeded_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.flames.seed = Some(21);
        config
    }

    fn cake_anchors() -> Vec<Anchor> {
        AnchorExtractor::default()
            .extract([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]].map(Vec3::from_array))
    }

    struct LoudSource;

    impl SpectrumSource for LoudSource {
        fn bin_count(&self) -> usize {
            8
        }

        fn read_frame(&mut self, bins: &mut [u8]) -> bool {
            bins.fill(255);
            true
        }
    }

    struct BrokenSink(PointCloud);

    impl PointSink for BrokenSink {
        fn reset(&mut self, styles: &[PointStyle]) {
            self.0.reset(styles);
        }

        fn write_position(&mut self, index: usize, position: Vec3) {
            self.0.write_position(index, position);
        }

        fn present(&mut self) -> Result<()> {
            Err(FlameVizError::msg("surface lost"))
        }
    }

    #[test]
    fn fixed_step_clock_starts_at_zero() {
        let mut clock = FixedStepClock::new(0.5);
        assert_eq!(clock.now(), 0.0);
        assert_eq!(clock.now(), 0.5);
        clock.reset();
        assert_eq!(clock.now(), 0.0);
        assert!(!clock.is_realtime());
    }

    #[test]
    fn shutdown_is_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn particles_appear_only_after_anchors_arrive() {
        let (sender, inbox) = AnchorInbox::channel();
        let (_publisher, level) = SignalLevel::channel();
        let mut frame_loop = FrameLoop::new(&seeded_config(), level, inbox);
        let mut cloud = PointCloud::new();

        frame_loop.tick(0.0, &mut cloud);
        assert!(frame_loop.field().is_empty());
        assert!(cloud.positions().is_empty());

        assert!(sender.send(cake_anchors()));
        frame_loop.tick(1.0 / 60.0, &mut cloud);

        assert_eq!(frame_loop.field().groups().len(), 2);
        assert_eq!(frame_loop.field().len(), 6);
        assert_eq!(cloud.positions().len(), 6);
        assert_eq!(cloud.styles().len(), 6);
        assert_eq!(cloud.frames_presented(), 2);
    }

    #[test]
    fn empty_anchor_set_spawns_nothing() {
        let (sender, inbox) = AnchorInbox::channel();
        let (_publisher, level) = SignalLevel::channel();
        let mut frame_loop = FrameLoop::new(&seeded_config(), level, inbox);
        let mut cloud = PointCloud::new();

        sender.send(Vec::new());
        drop(sender);
        frame_loop.tick(0.0, &mut cloud);
        frame_loop.tick(0.1, &mut cloud);

        assert!(frame_loop.field().is_empty());
        assert_eq!(frame_loop.frames(), 2);
    }

    #[test]
    fn inline_pipeline_drives_the_spread() {
        let config = seeded_config();
        let (sender, inbox) = AnchorInbox::channel();
        let (publisher, level) = SignalLevel::channel();
        let pipeline =
            SignalPipeline::with_source(publisher, SignalConfig::default(), Box::new(LoudSource));
        let mut frame_loop = FrameLoop::new(&config, level, inbox).with_pipeline(pipeline);
        let mut cloud = PointCloud::new();

        sender.send(cake_anchors());
        frame_loop.tick(0.0, &mut cloud);

        assert_eq!(frame_loop.level().get(), 1.0);
        for particle in frame_loop.field().particles() {
            assert!((particle.current_spread() - 4.0).abs() < 1e-6);
        }
    }

    #[test]
    fn silent_signal_keeps_flames_at_their_anchors() {
        let (sender, inbox) = AnchorInbox::channel();
        let (_publisher, level) = SignalLevel::channel();
        let mut frame_loop = FrameLoop::new(&seeded_config(), level, inbox);
        let mut cloud = PointCloud::new();
        let mut clock = FixedStepClock::new(1.0 / 60.0);

        sender.send(cake_anchors());
        let frames = frame_loop.run(&mut clock, &mut cloud, &ShutdownSignal::new(), Some(120));

        assert_eq!(frames, 120);
        for (particle, position) in frame_loop.field().particles().zip(cloud.positions()) {
            assert_eq!(particle.current_spread(), 0.0);
            assert!((*position - particle.base()).length() < 0.05);
        }
    }

    #[test]
    fn present_failures_do_not_stop_the_loop() {
        let (sender, inbox) = AnchorInbox::channel();
        let (_publisher, level) = SignalLevel::channel();
        let mut frame_loop = FrameLoop::new(&seeded_config(), level, inbox);
        let mut sink = BrokenSink(PointCloud::new());
        let mut clock = FixedStepClock::new(0.01);

        sender.send(cake_anchors());
        let frames = frame_loop.run(&mut clock, &mut sink, &ShutdownSignal::new(), Some(5));

        assert_eq!(frames, 5);
        assert_eq!(sink.0.positions().len(), 6);
    }

    #[test]
    fn cancelled_loop_renders_nothing() {
        let (_sender, inbox) = AnchorInbox::channel();
        let (_publisher, level) = SignalLevel::channel();
        let mut frame_loop = FrameLoop::new(&seeded_config(), level, inbox);
        let shutdown = ShutdownSignal::new();
        shutdown.cancel();

        let frames = frame_loop.run(
            &mut FixedStepClock::new(0.01),
            &mut PointCloud::new(),
            &shutdown,
            None,
        );

        assert_eq!(frames, 0);
    }
}
