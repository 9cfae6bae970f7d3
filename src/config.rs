//! Configuration file support for masksync.
//!
//! Settings are stored as versioned JSON. A missing file means defaults; a
//! file written by a newer version is rejected rather than half-read.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use masksync_raster::{AlphaPolarity, OverlayStyle, Rgb};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::scheduler::RetryPolicy;

/// Log level setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub panel: PanelConfig,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Where the segmentation and storage endpoints live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Per-panel behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Model selector sent with prepare
    pub model: String,
    /// Detection threshold in [0, 1]
    pub threshold: f32,
    pub overlay: OverlayConfig,
    pub scheduling: SchedulingConfig,
    pub upload: UploadConfig,
    pub brush: BrushConfig,
    pub layout: LayoutConfig,
}

impl PanelConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            overlay: OverlayConfig::default(),
            scheduling: SchedulingConfig::default(),
            upload: UploadConfig::default(),
            brush: BrushConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// `#rrggbb`
    pub color: String,
    pub opacity: f32,
    pub blur: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color: DEFAULT_OVERLAY_COLOR.to_string(),
            opacity: DEFAULT_OVERLAY_OPACITY,
            blur: 0.0,
        }
    }
}

impl OverlayConfig {
    /// Resolve to a render style. Unparseable colors fall back to red.
    pub fn style(&self) -> OverlayStyle {
        let color = Rgb::from_hex(&self.color).unwrap_or_else(|| {
            log::warn!("Invalid overlay color {:?}, using default", self.color);
            Rgb::default()
        });
        OverlayStyle {
            color,
            opacity: self.opacity.clamp(0.0, 1.0),
            blur: self.blur.max(0.0),
        }
    }
}

/// Debounce, warm-up and retry timings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub add_point_ms: u64,
    pub remove_point_ms: u64,
    pub busy_ms: u64,
    pub warmup_ms: u64,
    pub min_wait_ms: u64,
    pub upload_debounce_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            add_point_ms: ADD_POINT_DEBOUNCE_MS,
            remove_point_ms: REMOVE_POINT_DEBOUNCE_MS,
            busy_ms: BUSY_RECHECK_MS,
            warmup_ms: PREPARE_WARMUP_MS,
            min_wait_ms: PREPARE_MIN_WAIT_MS,
            upload_debounce_ms: UPLOAD_DEBOUNCE_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulingConfig {
    pub fn add_point(&self) -> Duration {
        Duration::from_millis(self.add_point_ms)
    }

    pub fn remove_point(&self) -> Duration {
        Duration::from_millis(self.remove_point_ms)
    }

    pub fn busy(&self) -> Duration {
        Duration::from_millis(self.busy_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    pub fn upload_debounce(&self) -> Duration {
        Duration::from_millis(self.upload_debounce_ms)
    }
}

/// Mask export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub polarity: Polarity,
    /// Upload retries before the edit is left unpersisted
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::Opaque,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Serialized form of [`AlphaPolarity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Opaque,
    Inverted,
}

impl From<Polarity> for AlphaPolarity {
    fn from(polarity: Polarity) -> Self {
        match polarity {
            Polarity::Opaque => AlphaPolarity::Opaque,
            Polarity::Inverted => AlphaPolarity::Inverted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub stroke_diameter: f32,
    pub point_diameter: f32,
    pub step: f32,
    pub coarse_step: f32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            stroke_diameter: DEFAULT_STROKE_DIAMETER,
            point_diameter: DEFAULT_POINT_DIAMETER,
            step: BRUSH_STEP,
            coarse_step: BRUSH_COARSE_STEP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub padding: f32,
    pub header: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            padding: PANEL_PADDING,
            header: PANEL_HEADER,
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            panel: PanelConfig::new(),
            log_level: LogLevel::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        if config.panel.model.is_empty() {
            config.panel.model = DEFAULT_MODEL.to_string();
        }
        config.panel.threshold = config.panel.threshold.clamp(0.0, 1.0);
        Ok(config)
    }

    /// Get the default config filename.
    pub fn default_filename() -> &'static str {
        "masksync-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("masksync").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("masksync")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load from `path`, or from the default path when `None`.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::new()),
            },
        };
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return Ok(Self::new());
        }

        let json = std::fs::read_to_string(&path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// State shared by every panel of one editor.
///
/// Passed into each panel constructor instead of living in a global. Panels
/// created from the same context start with the last brush diameter any of
/// them chose.
#[derive(Debug, Clone)]
pub struct EditorContext {
    config: Rc<PanelConfig>,
    brush_diameter: Rc<Cell<Option<f32>>>,
    panels: Rc<Cell<u64>>,
}

impl EditorContext {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            config: Rc::new(config),
            brush_diameter: Rc::new(Cell::new(None)),
            panels: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Last diameter chosen in any panel, if one was.
    pub fn brush_diameter(&self) -> Option<f32> {
        self.brush_diameter.get()
    }

    pub fn set_brush_diameter(&self, diameter: f32) {
        self.brush_diameter.set(Some(diameter));
    }

    /// Sequence number for a new panel, unique within this context.
    pub fn next_panel_sequence(&self) -> u64 {
        let next = self.panels.get() + 1;
        self.panels.set(next);
        next
    }
}

impl Default for EditorContext {
    fn default() -> Self {
        Self::new(PanelConfig::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::new();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.server.base_url, "http://127.0.0.1:8188");
        assert_eq!(config.panel.model, "auto");
        assert_eq!(config.panel.threshold, 0.7);
        assert_eq!(config.panel.scheduling.add_point_ms, 150);
        assert_eq!(config.panel.scheduling.remove_point_ms, 120);
        assert_eq!(config.panel.scheduling.warmup_ms, 1200);
        assert_eq!(config.panel.brush.stroke_diameter, 50.0);
        assert_eq!(config.panel.layout.header, 40.0);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = AppConfig::new();
        config.panel.threshold = 0.42;
        config.panel.upload.polarity = Polarity::Inverted;
        config.log_level = LogLevel::Debug;

        let json = config.to_json().unwrap();
        let loaded = AppConfig::from_json(&json).unwrap();
        assert_eq!(loaded.panel.threshold, 0.42);
        assert_eq!(loaded.panel.upload.polarity, Polarity::Inverted);
        assert_eq!(loaded.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config =
            AppConfig::from_json(r#"{"version": 1, "panel": {"threshold": 2.5}}"#).unwrap();
        assert_eq!(config.panel.threshold, 1.0);
        assert_eq!(config.panel.model, "auto");
        assert_eq!(config.panel.scheduling.retry.max_retries, 3);
        assert_eq!(config.server.timeout_secs, 60);
    }

    #[test]
    fn test_rejects_newer_version() {
        let json = format!(r#"{{"version": {}}}"#, CONFIG_VERSION + 1);
        assert!(matches!(
            AppConfig::from_json(&json),
            Err(ConfigError::VersionTooNew { .. })
        ));
    }

    #[test]
    fn test_overlay_style_falls_back() {
        let overlay = OverlayConfig {
            color: "nope".to_string(),
            opacity: 3.0,
            blur: -1.0,
        };
        let style = overlay.style();
        assert_eq!(style.color, Rgb::RED);
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.blur, 0.0);
    }

    #[test]
    fn test_editor_context_is_shared() {
        let ctx = EditorContext::default();
        let other = ctx.clone();
        assert_eq!(ctx.brush_diameter(), None);
        other.set_brush_diameter(35.0);
        assert_eq!(ctx.brush_diameter(), Some(35.0));

        assert_eq!(ctx.next_panel_sequence(), 1);
        assert_eq!(other.next_panel_sequence(), 2);
    }
}
