use std::fmt;
use std::time::{Duration, Instant};

use crate::access::health::{ChannelHealth, LinkState};
use crate::access::policy::{plan_commands, Verdict};
use crate::access::stop::StopSignal;
use crate::access::{Headless, Presenter};
use crate::camera::FrameSource;
use crate::channel::{ActuatorCommand, CommandChannel};
use crate::common::{Config, DispatchMode, Fault, Result};
use crate::core::FaceMatcher;

/// Resources owned by the decision loop for its whole life.
///
/// Teardown runs at most once, either explicitly or on drop.
pub struct LoopState<S: FrameSource, M: FaceMatcher, C: CommandChannel> {
    camera: S,
    matcher: M,
    channel: C,
    authorized_identity: String,
    torn_down: bool,
}

impl<S: FrameSource, M: FaceMatcher, C: CommandChannel> LoopState<S, M, C> {
    /// Acquires camera, matcher and channel in that order. On failure,
    /// whatever was already acquired is released before returning.
    pub fn init<FS, FM, FC>(
        authorized_identity: impl Into<String>,
        open_camera: FS,
        load_matcher: FM,
        open_channel: FC,
    ) -> std::result::Result<Self, Fault>
    where
        FS: FnOnce() -> Result<S>,
        FM: FnOnce() -> Result<M>,
        FC: FnOnce() -> Result<C>,
    {
        let mut camera = open_camera().map_err(Fault::Init)?;

        let matcher = match load_matcher() {
            Ok(matcher) => matcher,
            Err(e) => {
                camera.release();
                return Err(Fault::Init(e));
            }
        };

        let channel = match open_channel() {
            Ok(channel) => channel,
            Err(e) => {
                camera.release();
                return Err(Fault::Init(e));
            }
        };

        Ok(Self {
            camera,
            matcher,
            channel,
            authorized_identity: authorized_identity.into(),
            torn_down: false,
        })
    }

    pub fn authorized_identity(&self) -> &str {
        &self.authorized_identity
    }

    /// Releases the camera and closes the channel. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.camera.release();
        if let Err(e) = self.channel.close() {
            tracing::warn!("Failed to close actuator channel cleanly: {}", e);
        }
    }
}

impl<S: FrameSource, M: FaceMatcher, C: CommandChannel> Drop for LoopState<S, M, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub dispatch: DispatchMode,
    pub failure_threshold: u32,
    pub probe_interval: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dispatch: config.access.dispatch,
            failure_threshold: config.channel.failure_threshold,
            probe_interval: config.channel.probe_interval(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::PerDetection,
            failure_threshold: 5,
            probe_interval: Duration::from_secs(5),
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    /// The stop signal was raised; nothing was captured.
    Stopped,
    /// Frame capture failed.
    Skipped,
    /// The matcher failed on the frame; nothing was sent.
    MatchFailed,
    Processed {
        verdicts: Vec<Verdict>,
        sent: Vec<ActuatorCommand>,
        failed: Vec<ActuatorCommand>,
        suppressed: Vec<ActuatorCommand>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub match_faults: u64,
    pub commands_sent: u64,
    pub send_failures: u64,
    pub commands_suppressed: u64,
    pub degraded_entries: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames processed, {} skipped, {} match faults, {} commands sent, \
             {} send failures, {} suppressed, {} degraded episodes",
            self.frames_processed,
            self.frames_skipped,
            self.match_faults,
            self.commands_sent,
            self.send_failures,
            self.commands_suppressed,
            self.degraded_entries,
        )
    }
}

enum Dispatch {
    Sent,
    Failed,
    Suppressed,
}

pub struct DecisionLoop<S: FrameSource, M: FaceMatcher, C: CommandChannel> {
    state: LoopState<S, M, C>,
    settings: LoopSettings,
    health: ChannelHealth,
    stop: StopSignal,
    presenter: Box<dyn Presenter>,
    summary: RunSummary,
}

impl<S: FrameSource, M: FaceMatcher, C: CommandChannel> DecisionLoop<S, M, C> {
    pub fn new(state: LoopState<S, M, C>, settings: LoopSettings, stop: StopSignal) -> Self {
        let health = ChannelHealth::new(settings.failure_threshold, settings.probe_interval);
        Self {
            state,
            settings,
            health,
            stop,
            presenter: Box::new(Headless),
            summary: RunSummary::default(),
        }
    }

    pub fn with_presenter(mut self, presenter: Box<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn link_state(&self) -> LinkState {
        self.health.state()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Runs until the stop signal is raised, then tears down.
    pub fn run(mut self) -> RunSummary {
        tracing::info!(
            "Decision loop running (authorized: {}, dispatch: {:?})",
            self.state.authorized_identity(),
            self.settings.dispatch
        );

        while self.step() != Iteration::Stopped {}

        tracing::info!("Stop signal received, shutting down");
        self.shutdown()
    }

    /// Releases the camera and channel and returns the run summary.
    pub fn shutdown(mut self) -> RunSummary {
        self.presenter.finish();
        self.state.teardown();
        tracing::info!("Run summary: {}", self.summary);
        std::mem::take(&mut self.summary)
    }

    /// Runs one capture, match, dispatch and present cycle.
    pub fn step(&mut self) -> Iteration {
        if self.stop.is_raised() {
            return Iteration::Stopped;
        }

        self.probe_if_due(Instant::now());

        let frame = match self.state.camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                self.summary.frames_skipped += 1;
                tracing::warn!("{}; skipping frame", Fault::Capture(e));
                return Iteration::Skipped;
            }
        };

        let detections = match self.state.matcher.match_faces(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                self.summary.match_faults += 1;
                tracing::warn!("{}; no command for this frame", Fault::Match(e));
                self.present(&frame, &[]);
                return Iteration::MatchFailed;
            }
        };

        let verdicts: Vec<Verdict> = detections
            .into_iter()
            .map(|d| Verdict::evaluate(d, &self.state.authorized_identity))
            .collect();

        for verdict in &verdicts {
            if verdict.decision.is_grant() {
                tracing::info!("Access granted for {}", verdict.detection.identity);
            } else {
                tracing::info!("Access denied for {}", verdict.detection.identity);
            }
        }

        let mut sent = Vec::new();
        let mut failed = Vec::new();
        let mut suppressed = Vec::new();
        for command in plan_commands(&verdicts, self.settings.dispatch) {
            match self.dispatch(command) {
                Dispatch::Sent => sent.push(command),
                Dispatch::Failed => failed.push(command),
                Dispatch::Suppressed => suppressed.push(command),
            }
        }

        self.summary.frames_processed += 1;
        self.present(&frame, &verdicts);

        Iteration::Processed { verdicts, sent, failed, suppressed }
    }

    fn dispatch(&mut self, command: ActuatorCommand) -> Dispatch {
        if self.health.is_degraded() {
            self.summary.commands_suppressed += 1;
            tracing::debug!("Actuator link degraded; suppressed {}", command);
            return Dispatch::Suppressed;
        }

        match self.state.channel.send(command) {
            Ok(()) => {
                self.health.record_success();
                self.summary.commands_sent += 1;
                tracing::debug!("Sent {}", command);
                Dispatch::Sent
            }
            Err(e) => {
                self.summary.send_failures += 1;
                tracing::warn!("Failed to send {}: {}", command, Fault::Channel(e));

                if self.health.record_failure(Instant::now()) {
                    self.summary.degraded_entries += 1;
                    tracing::error!(
                        "Actuator link DEGRADED after {} consecutive failures; \
                         suppressing commands until the link recovers",
                        self.health.consecutive_failures()
                    );
                }
                Dispatch::Failed
            }
        }
    }

    fn probe_if_due(&mut self, now: Instant) {
        if !self.health.probe_due(now) {
            return;
        }

        match self.state.channel.probe() {
            Ok(()) => {
                self.health.record_probe(now, true);
                tracing::info!("Actuator link recovered");
            }
            Err(e) => {
                self.health.record_probe(now, false);
                tracing::warn!("Actuator link still degraded: {}", e);
            }
        }
    }

    fn present(&mut self, frame: &crate::core::Frame, verdicts: &[Verdict]) {
        if let Err(e) = self.presenter.present(frame, verdicts, self.health.state()) {
            tracing::warn!("Presentation failed: {}", e);
        }
    }
}
