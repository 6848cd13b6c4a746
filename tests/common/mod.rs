#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use facegate::{
    ActuatorCommand, BoundingBox, ChannelError, CommandChannel, Detection, FaceMatcher, Frame,
    FrameSource, GateError, Identity, Result, StopSignal,
};
use image::DynamicImage;

pub fn detection(label: &str) -> Detection {
    Detection::new(BoundingBox::new(10, 110, 130, 10), Identity::known(label))
}

pub fn unknown() -> Detection {
    Detection::new(BoundingBox::new(10, 110, 130, 10), Identity::Unknown)
}

/// Camera that succeeds or fails according to a script, then keeps succeeding.
#[derive(Clone, Default)]
pub struct ScriptedCamera {
    script: Arc<Mutex<VecDeque<bool>>>,
    pub captures: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: &[bool]) -> Self {
        let camera = Self::default();
        camera.script.lock().unwrap().extend(script.iter().copied());
        camera
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedCamera {
    fn capture(&mut self) -> Result<Frame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            Ok(DynamicImage::new_luma8(4, 4))
        } else {
            Err(GateError::Camera("dropped frame".into()))
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Matcher returning scripted detections per frame. Once the script runs out
/// it raises `stop` (if set) and returns no faces.
#[derive(Clone, Default)]
pub struct ScriptedMatcher {
    script: Arc<Mutex<VecDeque<std::result::Result<Vec<Detection>, String>>>>,
    stop: Option<StopSignal>,
}

impl ScriptedMatcher {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        let matcher = Self::default();
        matcher.script.lock().unwrap().extend(frames.into_iter().map(Ok));
        matcher
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn push_frame(&self, detections: Vec<Detection>) {
        self.script.lock().unwrap().push_back(Ok(detections));
    }

    pub fn stop_when_exhausted(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl FaceMatcher for ScriptedMatcher {
    fn match_faces(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(GateError::Model(message)),
            None => {
                if let Some(stop) = &self.stop {
                    stop.raise();
                }
                Ok(Vec::new())
            }
        }
    }
}

/// Channel that records what it is asked to do.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    pub sent: Arc<Mutex<Vec<ActuatorCommand>>>,
    pub attempts: Arc<AtomicUsize>,
    pub probes: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub fail_sends: Arc<AtomicBool>,
    pub fail_probes: Arc<AtomicBool>,
    pub send_delay: Duration,
    pub probe_delay: Duration,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let channel = Self::default();
        channel.fail_sends.store(true, Ordering::SeqCst);
        channel.fail_probes.store(true, Ordering::SeqCst);
        channel
    }

    pub fn heal(&self) {
        self.fail_sends.store(false, Ordering::SeqCst);
        self.fail_probes.store(false, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ActuatorCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl CommandChannel for RecordingChannel {
    fn send(&mut self, command: ActuatorCommand) -> std::result::Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.send_delay);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Disconnected("actuator unplugged".into()));
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }

    fn probe(&mut self) -> std::result::Result<(), ChannelError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.probe_delay);
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(ChannelError::Port("no such device".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), ChannelError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
