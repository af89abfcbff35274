use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::gestures::HostSurface;
use crate::snap::GridSnapper;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory to keep the profile in")]
    NoHome,
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid profile: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub click_distance: f64,
    pub click_time_ms: u64,
    pub double_click_interval_ms: u64,
    pub point_radius: f64,
    pub fadeout_duration_ms: u64,
    pub fadeout_max_steps: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            click_distance: 6.0,
            click_time_ms: 200,
            double_click_interval_ms: 500,
            point_radius: 10.0,
            fadeout_duration_ms: 300,
            fadeout_max_steps: 25,
        }
    }
}

impl Thresholds {
    pub fn click_time(&self) -> Duration {
        Duration::from_millis(self.click_time_ms)
    }

    pub fn double_click_interval(&self) -> Duration {
        Duration::from_millis(self.double_click_interval_ms)
    }

    pub fn fadeout_duration(&self) -> Duration {
        Duration::from_millis(self.fadeout_duration_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub grid: f64,
    pub secondary_grid: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            grid: 8.0,
            secondary_grid: 32.0,
        }
    }
}

impl SnapConfig {
    pub fn snapper(&self) -> GridSnapper {
        GridSnapper::new(self.grid, self.secondary_grid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl SurfaceConfig {
    pub fn surface(&self) -> HostSurface {
        HostSurface::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub snap: SnapConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
}

impl Profile {
    pub fn name(&self) -> &str {
        self.meta.name.as_deref().unwrap_or("unnamed")
    }

    pub fn from_toml(txt: &str, path: &Path) -> Result<Self> {
        let profile: Profile = toml::from_str(txt).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&txt, path)
    }

    /// Loads the user profile, writing the bundled default first if there is none.
    pub fn load_or_install_default() -> Result<Self> {
        let path = default_profile_path()?;
        install_default_at(&path)?;
        Self::load(&path)
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or(ConfigError::NoHome)?;
    Ok(dirs.home_dir().join(".config").join("pointerctl"))
}

pub fn default_profile_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

fn install_default_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    fs::write(path, default_profile_text()).map_err(write_err)?;
    info!("installed default profile at {}", path.display());
    Ok(())
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if th.double_click_interval_ms == 0 || th.fadeout_duration_ms == 0 {
        return Err(ConfigError::Invalid(
            "thresholds must be positive durations".into(),
        ));
    }
    if !(th.click_distance > 0.0) {
        return Err(ConfigError::Invalid(
            "thresholds.click_distance must be positive".into(),
        ));
    }
    if !(th.point_radius > 0.0) {
        return Err(ConfigError::Invalid(
            "thresholds.point_radius must be positive".into(),
        ));
    }
    if th.fadeout_max_steps == 0 {
        return Err(ConfigError::Invalid(
            "thresholds.fadeout_max_steps must be at least 1".into(),
        ));
    }
    if !(p.snap.grid > 0.0 && p.snap.secondary_grid > 0.0) {
        return Err(ConfigError::Invalid("snap spacings must be positive".into()));
    }
    if !(p.surface.width > 0.0 && p.surface.height > 0.0) {
        return Err(ConfigError::Invalid("surface size must be positive".into()));
    }
    Ok(())
}
