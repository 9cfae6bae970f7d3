//! Prepare/detect handshake with the remote model.
//!
//! One [`SegmentationSession`] per panel. `prepare` binds the model to the
//! current [`ImageRecord`]; detect requests are only sent once a prepare has
//! been issued and the warm-up window since it has passed. A failed prepare
//! does not block detection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::annotation::PointSet;
use crate::service::{DetectRequest, PrepareRequest, ViewRequest};
use crate::token::{RequestToken, TokenCounter};

/// Identity of an upstream image on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ImageRecord {
    /// Build a record, stripping any trailing `" [label]"` from the filename.
    pub fn new(filename: &str, subfolder: &str, kind: &str) -> Self {
        Self {
            filename: sanitize_filename(filename),
            subfolder: subfolder.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn view_request(&self) -> ViewRequest {
        ViewRequest {
            filename: self.filename.clone(),
            kind: self.kind.clone(),
            subfolder: self.subfolder.clone(),
        }
    }
}

/// Hosts decorate filenames with a bracketed label (`cat.png [output]`).
pub fn sanitize_filename(name: &str) -> String {
    let trimmed = name.trim_end();
    let Some(body) = trimmed.strip_suffix(']') else {
        return name.to_string();
    };
    let Some(open) = body.rfind('[') else {
        return name.to_string();
    };
    if body[open + 1..].contains(']') {
        return name.to_string();
    }
    body[..open].trim_end().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unprepared,
    Preparing,
    Ready,
    Failed,
}

/// Whether a detect may be sent now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectGate {
    /// No image bound yet.
    NotPrepared,
    /// Model may still be loading; try again after this long.
    Warmup(Duration),
    Proceed,
}

#[derive(Debug)]
pub struct SegmentationSession {
    state: SessionState,
    model: String,
    bound: Option<ImageRecord>,
    tokens: TokenCounter,
    prepared_at: Option<Instant>,
    warmup: Duration,
    min_wait: Duration,
}

impl SegmentationSession {
    pub fn new(model: &str, warmup: Duration, min_wait: Duration) -> Self {
        Self {
            state: SessionState::Unprepared,
            model: model.to_string(),
            bound: None,
            tokens: TokenCounter::new(),
            prepared_at: None,
            warmup,
            min_wait,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn bound(&self) -> Option<&ImageRecord> {
        self.bound.as_ref()
    }

    /// Change the model selector. Returns whether it changed; the caller
    /// re-prepares.
    pub fn set_model(&mut self, model: &str) -> bool {
        let model = if model.is_empty() { "auto" } else { model };
        if self.model == model {
            return false;
        }
        self.model = model.to_string();
        true
    }

    /// Start a prepare for `record`. Any earlier prepare becomes stale.
    pub fn begin_prepare(&mut self, record: &ImageRecord, now: Instant) -> (RequestToken, PrepareRequest) {
        let token = self.tokens.issue();
        self.state = SessionState::Preparing;
        self.bound = Some(record.clone());
        self.prepared_at = Some(now);
        log::info!(
            "Preparing model {:?} for {:?} ({})",
            self.model,
            record.filename,
            token
        );
        let request = PrepareRequest {
            model: self.model.clone(),
            filename: record.filename.clone(),
            kind: record.kind.clone(),
            subfolder: record.subfolder.clone(),
        };
        (token, request)
    }

    /// Apply a prepare response. Returns `false` if it was stale.
    pub fn finish_prepare(&mut self, token: RequestToken, ok: bool) -> bool {
        if !self.tokens.is_current(token) {
            log::debug!("Ignoring stale prepare response {}", token);
            return false;
        }
        self.state = if ok {
            SessionState::Ready
        } else {
            SessionState::Failed
        };
        log::info!("Prepare {} finished: {:?}", token, self.state);
        true
    }

    pub fn detect_gate(&self, now: Instant) -> DetectGate {
        let Some(prepared_at) = self.prepared_at else {
            return DetectGate::NotPrepared;
        };
        let elapsed = now.saturating_duration_since(prepared_at);
        if elapsed < self.warmup {
            let wait = (self.warmup - elapsed).max(self.min_wait);
            return DetectGate::Warmup(wait);
        }
        DetectGate::Proceed
    }

    /// The full point set as a detect request.
    pub fn detect_request(&self, points: &PointSet, threshold: f32) -> DetectRequest {
        DetectRequest {
            positive_points: points.positives(),
            negative_points: points.negatives(),
            threshold,
        }
    }

    pub fn retire(&mut self) {
        self.tokens.retire();
        self.state = SessionState::Unprepared;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Point;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn session() -> SegmentationSession {
        SegmentationSession::new("auto", ms(1200), ms(200))
    }

    fn record(name: &str) -> ImageRecord {
        ImageRecord::new(name, "", "input")
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("cat.png [output]"), "cat.png");
        assert_eq!(sanitize_filename("cat.png[temp]  "), "cat.png");
        assert_eq!(sanitize_filename("a [x] [y]"), "a [x]");
        assert_eq!(sanitize_filename("cat.png"), "cat.png");
        assert_eq!(sanitize_filename("odd]name]"), "odd]name]");
        assert_eq!(sanitize_filename("a [x]y]"), "a [x]y]");
    }

    #[test]
    fn test_prepare_transitions() {
        let now = Instant::now();
        let mut s = session();
        assert_eq!(s.state(), SessionState::Unprepared);

        let (token, request) = s.begin_prepare(&record("cat.png"), now);
        assert_eq!(s.state(), SessionState::Preparing);
        assert_eq!(request.model, "auto");
        assert_eq!(request.filename, "cat.png");

        assert!(s.finish_prepare(token, true));
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn test_stale_prepare_cannot_mark_ready() {
        let now = Instant::now();
        let mut s = session();
        let (old, _) = s.begin_prepare(&record("a.png"), now);
        let (new, _) = s.begin_prepare(&record("b.png"), now);

        assert!(!s.finish_prepare(old, true));
        assert_eq!(s.state(), SessionState::Preparing);
        assert!(s.finish_prepare(new, false));
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[test]
    fn test_detect_gate_warmup() {
        let now = Instant::now();
        let mut s = session();
        assert_eq!(s.detect_gate(now), DetectGate::NotPrepared);

        s.begin_prepare(&record("a.png"), now);
        assert_eq!(s.detect_gate(now + ms(300)), DetectGate::Warmup(ms(900)));
        assert_eq!(s.detect_gate(now + ms(1100)), DetectGate::Warmup(ms(200)));
        assert_eq!(s.detect_gate(now + ms(1200)), DetectGate::Proceed);
    }

    #[test]
    fn test_set_model() {
        let mut s = session();
        assert!(!s.set_model("auto"));
        assert!(s.set_model("vit_b"));
        assert!(!s.set_model("vit_b"));
        assert!(s.set_model(""));
        assert_eq!(s.model(), "auto");
    }

    #[test]
    fn test_detect_request_has_all_points() {
        let s = session();
        let mut points = PointSet::new();
        points.push(Point::positive(10, 10));
        points.push(Point::positive(50, 50));
        points.push(Point::negative(30, 30));

        let request = s.detect_request(&points, 0.7);
        assert_eq!(request.positive_points, vec![[10, 10], [50, 50]]);
        assert_eq!(request.negative_points, vec![[30, 30]]);
        assert_eq!(request.threshold, 0.7);
    }
}
