use std::fs;
use std::path::PathBuf;

use crate::common::error::Result;

/// Local development context. When enabled, snapshots and the embedding
/// cache live under `./dev_data` instead of system locations.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(base_dir.join("captures"))?;
            fs::create_dir_all(base_dir.join("cache"))?;

            println!("📁 Development mode enabled - data will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn captures_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("captures"))
    }

    /// Where the gallery embedding cache is kept.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if self.enabled {
            Some(self.base_dir.join("cache"))
        } else {
            crate::common::paths::cache_dir()
        }
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        match self.captures_dir() {
            Some(dir) => {
                let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
                dir.join(format!("{}_{}.jpg", prefix, timestamp))
            }
            // Outside dev mode, use the current directory
            None => PathBuf::from(format!("{}.jpg", prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_mode_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let dev = DevMode::with_base_dir(true, tmp.path().to_path_buf()).unwrap();

        assert!(tmp.path().join("captures").is_dir());
        assert_eq!(dev.cache_dir(), Some(tmp.path().join("cache")));

        let capture = dev.get_capture_path("frame");
        assert!(capture.starts_with(tmp.path().join("captures")));
        assert!(capture.to_string_lossy().ends_with(".jpg"));
    }

    #[test]
    fn disabled_mode_writes_to_current_dir() {
        let dev = DevMode::with_base_dir(false, PathBuf::from("/nonexistent")).unwrap();
        assert!(dev.captures_dir().is_none());
        assert_eq!(dev.get_capture_path("test_capture"), PathBuf::from("test_capture.jpg"));
    }
}
