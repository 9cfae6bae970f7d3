//! Global constants for masksync

/// Default segmentation server.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";

/// Default HTTP timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Model selector sent with prepare when the user hasn't picked one.
pub const DEFAULT_MODEL: &str = "auto";

/// Detection threshold, as a fraction of full luminance.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Threshold change per ctrl+wheel notch.
pub const THRESHOLD_STEP: f32 = 0.02;

/// Default overlay tint.
pub const DEFAULT_OVERLAY_COLOR: &str = "#ff0000";

/// Default overlay opacity.
pub const DEFAULT_OVERLAY_OPACITY: f32 = 0.5;

// Scheduling (milliseconds)

/// Debounce after adding a point.
pub const ADD_POINT_DEBOUNCE_MS: u64 = 150;

/// Debounce after removing a point.
pub const REMOVE_POINT_DEBOUNCE_MS: u64 = 120;

/// Re-check delay when a request is already in flight.
pub const BUSY_RECHECK_MS: u64 = 150;

/// Time allowed for the model to load after prepare is issued.
pub const PREPARE_WARMUP_MS: u64 = 1200;

/// Lower bound on any warm-up wait.
pub const PREPARE_MIN_WAIT_MS: u64 = 200;

/// First retry delay.
pub const RETRY_BASE_MS: u64 = 250;

/// Retry delay multiplier per attempt.
pub const RETRY_GROWTH: f32 = 1.4;

/// Cap on any single retry delay.
pub const RETRY_MAX_MS: u64 = 5000;

/// Retries before giving up until the next user action.
pub const MAX_RETRIES: u32 = 3;

/// Delay before uploading after the mask changes.
pub const UPLOAD_DEBOUNCE_MS: u64 = 0;

// Brush

/// Default brush diameter for freehand panels.
pub const DEFAULT_STROKE_DIAMETER: f32 = 50.0;

/// Default cursor diameter for point panels.
pub const DEFAULT_POINT_DIAMETER: f32 = 6.0;

/// Diameter change per wheel notch.
pub const BRUSH_STEP: f32 = 5.0;

/// Diameter change per wheel notch with ctrl held.
pub const BRUSH_COARSE_STEP: f32 = 10.0;

/// Brush diameter range, inclusive.
pub const MIN_BRUSH_DIAMETER: f32 = 1.0;
pub const MAX_BRUSH_DIAMETER: f32 = 200.0;

// Layout

/// Padding around the image area.
pub const PANEL_PADDING: f32 = 8.0;

/// Height reserved above the image area.
pub const PANEL_HEADER: f32 = 40.0;

// Persistence

/// Upload name prefix for freehand masks.
pub const STROKE_MASK_PREFIX: &str = "mask";

/// Upload name prefix for detected masks.
pub const POINT_MASK_PREFIX: &str = "sam_mask";

/// Suffix marking an explicit empty mask.
pub const EMPTY_MASK_SUFFIX: &str = "_empty";

/// Storage type for uploads and stored masks.
pub const INPUT_STORAGE_TYPE: &str = "input";
