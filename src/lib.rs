// Core modules
pub mod access;
pub mod camera;
pub mod channel;
pub mod cli;
pub mod common;
pub mod core;
pub mod storage;

// Re-export commonly used types
pub use crate::access::{
    decide, AccessDecision, DecisionLoop, Iteration, LinkState, LoopSettings, LoopState,
    Presenter, RunSummary, StopSignal, Verdict,
};
pub use crate::camera::{Camera, FrameSource};
pub use crate::channel::{ActuatorCommand, ChannelError, CommandChannel, SerialChannel, TimedChannel};
pub use crate::common::{Config, DevMode, DispatchMode, Fault, GateError, Result};
pub use crate::core::{BoundingBox, Detection, FaceMatcher, Frame, Identity, OnnxFaceMatcher, ReferenceGallery};
pub use crate::storage::GalleryCache;
