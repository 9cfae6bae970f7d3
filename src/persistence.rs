//! Mask upload and the persisted handle.
//!
//! Uploads go through their own [`RequestScheduler`], so at most one is in
//! flight and a newer request makes the in-flight one stale. The PNG is
//! encoded from the canonical mask when the upload fires, not when it was
//! requested. Only a current, successful upload writes `mask_path`.

use std::path::Path;
use std::time::Duration;

use masksync_raster::{AlphaPolarity, CanonicalMask};
use serde::{Deserialize, Serialize};
use web_time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::ConfigError;
use crate::constants::{EMPTY_MASK_SUFFIX, INPUT_STORAGE_TYPE};
use crate::error::ServiceError;
use crate::scheduler::{Disposition, RequestScheduler, RetryPolicy, Tick};
use crate::service::UploadRequest;
use crate::token::RequestToken;

/// Node state that survives panel close/reopen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMaskState {
    /// Storage handle of the last uploaded mask; empty means never uploaded.
    #[serde(default)]
    pub mask_path: String,
    /// Overlay color as `#rrggbb`.
    #[serde(default)]
    pub mask_color: String,
}

impl PersistedMaskState {
    /// Read state from a JSON file. A missing file is a fresh node.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Saved mask state to {:?}", path);
        Ok(())
    }
}

/// `<prefix>_<millis>_<sequence>[_empty].png`
pub fn upload_name(prefix: &str, millis: u128, sequence: u64, empty: bool) -> String {
    let suffix = if empty { EMPTY_MASK_SUFFIX } else { "" };
    format!("{}_{}_{}{}.png", prefix, millis, sequence, suffix)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub struct MaskPersistence {
    scheduler: RequestScheduler,
    prefix: &'static str,
    sequence: u64,
    polarity: AlphaPolarity,
    debounce: Duration,
    state: PersistedMaskState,
    in_flight_name: Option<String>,
}

impl MaskPersistence {
    pub fn new(
        prefix: &'static str,
        sequence: u64,
        polarity: AlphaPolarity,
        policy: RetryPolicy,
        busy: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            scheduler: RequestScheduler::new("upload", policy, busy),
            prefix,
            sequence,
            polarity,
            debounce,
            state: PersistedMaskState::default(),
            in_flight_name: None,
        }
    }

    pub fn state(&self) -> &PersistedMaskState {
        &self.state
    }

    /// Restore state saved by an earlier panel.
    pub fn restore(&mut self, state: PersistedMaskState) {
        self.state = state;
    }

    pub fn set_mask_color(&mut self, color: String) {
        self.state.mask_color = color;
    }

    pub fn handle(&self) -> &str {
        &self.state.mask_path
    }

    /// Panel sequence number used in upload names.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    /// Ask for the current mask to be persisted. Supersedes any upload
    /// already in flight.
    pub fn request(&mut self, now: Instant) {
        self.scheduler.invalidate();
        self.scheduler.trigger(now, self.debounce);
    }

    /// If an upload is due, encode `mask` and return the request to send.
    pub fn poll(&mut self, now: Instant, mask: &CanonicalMask) -> Option<(RequestToken, UploadRequest)> {
        if self.scheduler.poll(now) != Tick::Ready {
            return None;
        }

        let png = match mask.encode_png(self.polarity) {
            Ok(png) => png,
            Err(e) => {
                log::error!("Failed to encode mask: {}", e);
                return None;
            }
        };
        let empty = mask.is_empty();
        let name = upload_name(self.prefix, unix_millis(), self.sequence, empty);
        let token = self.scheduler.begin();
        log::info!(
            "Uploading {}mask {} ({} bytes, {})",
            if empty { "empty " } else { "" },
            name,
            png.len(),
            token
        );
        self.in_flight_name = Some(name.clone());

        Some((
            token,
            UploadRequest {
                name,
                png,
                kind: INPUT_STORAGE_TYPE.to_string(),
                overwrite: true,
            },
        ))
    }

    /// Apply an upload result. Returns the new handle if it was committed.
    pub fn finish(
        &mut self,
        token: RequestToken,
        result: Result<String, ServiceError>,
        now: Instant,
    ) -> Option<&str> {
        let name = self.in_flight_name.take();
        let disposition = match &result {
            Ok(_) => self.scheduler.finish(token, true, now),
            Err(e) => {
                log::warn!("Mask upload {} failed: {}", name.as_deref().unwrap_or("?"), e);
                self.scheduler.finish(token, false, now)
            }
        };

        match (disposition, result) {
            (Disposition::Commit, Ok(handle)) => {
                log::info!("Mask stored as {}", handle);
                self.state.mask_path = handle;
                Some(&self.state.mask_path)
            }
            (Disposition::Stale, Ok(handle)) => {
                log::debug!("Upload {} superseded, discarding handle", handle);
                None
            }
            (Disposition::Exhausted, _) => {
                log::warn!("Giving up on mask upload; stored mask may be out of date");
                None
            }
            _ => None,
        }
    }

    /// Teardown.
    pub fn retire(&mut self) {
        self.scheduler.retire();
        self.in_flight_name = None;
    }
}
