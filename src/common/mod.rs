pub mod config;
pub mod dev_mode;
pub mod error;
pub mod paths;

pub use config::{Config, DispatchMode};
pub use dev_mode::DevMode;
pub use error::{Fault, GateError, Result};
