//! Synthetic raster fixtures for grid sweeps.
//!
//! Each grid run reads one square 8-bit grayscale PNG per environmental
//! channel from a staging directory. The directory is wiped and rewritten
//! before every run and removed when the sweep ends.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError, Luma};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::metrics::METRICS;

/// One environmental channel and the constant intensity it is filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureChannel {
    pub name: &'static str,
    pub intensity: u8,
}

pub const DEFAULT_CHANNELS: [FixtureChannel; 4] = [
    FixtureChannel {
        name: "temperature",
        intensity: 128,
    },
    FixtureChannel {
        name: "humidity",
        intensity: 128,
    },
    FixtureChannel {
        name: "elevation",
        intensity: 20,
    },
    FixtureChannel {
        name: "population",
        intensity: 0,
    },
];

/// The set of fixtures written into a staging directory.
#[derive(Debug, Clone)]
pub struct FixtureSet {
    dir: PathBuf,
    channels: Vec<FixtureChannel>,
}

impl FixtureSet {
    /// Fixture set with the four default channels.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_channels(dir, DEFAULT_CHANNELS.to_vec())
    }

    pub fn with_channels(dir: impl Into<PathBuf>, channels: Vec<FixtureChannel>) -> Self {
        Self {
            dir: dir.into(),
            channels,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn channels(&self) -> &[FixtureChannel] {
        &self.channels
    }

    /// Replace the staging directory's contents with fixtures of side `dimension`
    /// for the configuration `label`.
    pub fn stage(&self, label: &str, dimension: u32) -> Result<Vec<PathBuf>> {
        if dimension == 0 {
            return Err(HarnessError::InvalidPlan(format!(
                "grid dimension must be positive ({label})"
            )));
        }
        let staging_err = |path: &Path, source: io::Error| HarnessError::Fixture {
            label: label.to_string(),
            path: path.to_path_buf(),
            source: ImageError::IoError(source),
        };
        self.clear().map_err(|e| staging_err(&self.dir, e))?;
        fs::create_dir_all(&self.dir).map_err(|e| staging_err(&self.dir, e))?;

        let mut written = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let path = self.dir.join(format!("{}.png", channel.name));
            GrayImage::from_pixel(dimension, dimension, Luma([channel.intensity]))
                .save(&path)
                .map_err(|source| HarnessError::Fixture {
                    label: label.to_string(),
                    path: path.clone(),
                    source,
                })?;
            written.push(path);
        }

        METRICS.add_fixtures(written.len() as u64);
        debug!(run = %label, dir = %self.dir.display(), dimension, count = written.len(), "staged grid fixtures");
        Ok(written)
    }

    /// Remove the staging directory if it exists.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Removes the staging directory when dropped, so a sweep that ends early
/// never leaves stale fixtures behind.
pub struct StagingGuard<'a> {
    fixtures: &'a FixtureSet,
}

impl<'a> StagingGuard<'a> {
    pub fn new(fixtures: &'a FixtureSet) -> Self {
        Self { fixtures }
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.fixtures.clear() {
            tracing::warn!(dir = %self.fixtures.dir.display(), error = %e, "failed to remove fixture directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_writes_one_constant_image_per_channel() {
        let root = tempfile::tempdir().unwrap();
        let fixtures = FixtureSet::new(root.path().join("grid"));
        assert!(!fixtures.dir().exists());

        let written = fixtures.stage("grid400x400-2000", 400).unwrap();
        assert_eq!(written.len(), 4);

        for (path, channel) in written.iter().zip(DEFAULT_CHANNELS.iter()) {
            assert_eq!(path.file_name().unwrap(), format!("{}.png", channel.name).as_str());
            let img = image::open(path).unwrap();
            assert_eq!(img.color(), image::ColorType::L8);
            let gray = img.to_luma8();
            assert_eq!(gray.dimensions(), (400, 400));
            assert!(gray.pixels().all(|p| p.0[0] == channel.intensity));
        }
    }

    #[test]
    fn test_restage_replaces_previous_fixtures() {
        let root = tempfile::tempdir().unwrap();
        let fixtures = FixtureSet::new(root.path().join("grid"));
        fixtures.stage("grid8x8-1", 8).unwrap();
        std::fs::write(fixtures.dir().join("stale.txt"), "left over").unwrap();

        fixtures.stage("grid16x16-1", 16).unwrap();
        assert!(!fixtures.dir().join("stale.txt").exists());
        let img = image::open(fixtures.dir().join("elevation.png")).unwrap();
        assert_eq!(img.to_luma8().dimensions(), (16, 16));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let root = tempfile::tempdir().unwrap();
        let fixtures = FixtureSet::new(root.path().join("grid"));
        assert!(matches!(
            fixtures.stage("grid0x0-5", 0),
            Err(HarnessError::InvalidPlan(_))
        ));
        assert!(!fixtures.dir().exists());
    }

    #[test]
    fn test_staging_failure_names_configuration() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("blocked"), "a file, not a directory").unwrap();
        let fixtures = FixtureSet::new(root.path().join("blocked").join("grid"));

        let err = fixtures.stage("grid8x8-10", 8).unwrap_err();
        assert!(matches!(err, HarnessError::Fixture { ref label, .. } if label == "grid8x8-10"));
        assert!(err.to_string().contains("grid8x8-10"));
    }

    #[test]
    fn test_guard_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let fixtures = FixtureSet::new(root.path().join("grid"));
        {
            let _guard = StagingGuard::new(&fixtures);
            fixtures.stage("grid4x4-0", 4).unwrap();
            assert!(fixtures.dir().exists());
        }
        assert!(!fixtures.dir().exists());
    }

    #[test]
    fn test_clear_missing_directory_is_ok() {
        let root = tempfile::tempdir().unwrap();
        FixtureSet::new(root.path().join("never-created")).clear().unwrap();
    }
}
