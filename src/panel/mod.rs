//! The mask editing panel.
//!
//! A [`MaskPanel`] ties together one image, its annotations, the canonical
//! mask, the segmentation session and the upload pipeline. It is driven from
//! a single thread by two entry points:
//! - [`MaskPanel::handle_input`] for pointer, wheel and key events;
//! - [`MaskPanel::tick`] to drain finished service calls and fire whatever
//!   request is due.
//!
//! Network work happens behind the [`Transport`]; every job carries a token
//! and completions whose token is no longer current are dropped on arrival.

use std::fmt;
use std::time::Duration;

use image::DynamicImage;
use masksync_raster::{
    BrushCursor, CanonicalMask, ImageHandle, OverlayStyle, Pixmap, PointMarker, PreviewScene, Rgb,
    render_preview,
};
use web_time::Instant;

use crate::annotation::{
    AnnotationStore, BrushSettings, PanelMode, Point, PointLabel, PointSet, brush_op,
};
use crate::config::{EditorContext, PanelConfig};
use crate::constants::{INPUT_STORAGE_TYPE, POINT_MASK_PREFIX, STROKE_MASK_PREFIX, THRESHOLD_STEP};
use crate::error::{Result, ServiceError};
use crate::input::{EventKind, InputEvent, Key, Modifiers, MouseButton};
use crate::persistence::{MaskPersistence, PersistedMaskState};
use crate::scheduler::{Disposition, RequestScheduler, Tick};
use crate::service::ViewRequest;
use crate::session::{DetectGate, ImageRecord, SegmentationSession, SessionState};
use crate::space::{HostView, ImageSize, PanelLayout, Rect, SpaceMapper};
use crate::token::{RequestToken, TokenCounter};
use crate::transport::{Completion, Job, Transport};


/// Short status shown in the panel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStatus {
    Preparing,
    PrepareFailed,
    Detecting,
    Ready,
    Idle,
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PanelStatus::Preparing => "preparing",
            PanelStatus::PrepareFailed => "prepare failed",
            PanelStatus::Detecting => "detecting",
            PanelStatus::Ready => "ready",
            PanelStatus::Idle => "idle",
        };
        f.write_str(text)
    }
}

pub struct MaskPanel<T: Transport> {
    ctx: EditorContext,
    config: PanelConfig,
    transport: T,

    // Geometry
    layout: PanelLayout,
    view: HostView,
    rect: Rect,
    mapper: Option<SpaceMapper>,

    // Image and edits
    record: Option<ImageRecord>,
    had_record: bool,
    image: Option<ImageHandle>,
    store: AnnotationStore,
    mask: Option<CanonicalMask>,
    /// Stroke buffer changed since it was last written into `mask`.
    stroke_dirty: bool,
    /// Stored mask that arrived before the source image.
    stored_mask: Option<DynamicImage>,
    brush: BrushSettings,
    threshold: f32,
    overlay: OverlayStyle,

    // Requests
    session: SegmentationSession,
    detect: RequestScheduler,
    persistence: MaskPersistence,
    image_loads: TokenCounter,
    mask_loads: TokenCounter,
    image_pending: bool,
    mask_pending: bool,

    // Pointer
    pointer: Option<(f32, f32)>,
    drawing: bool,

    retired: bool,
}

impl<T: Transport> MaskPanel<T> {
    /// Create a panel editing in `mode`, with settings and shared brush state
    /// from `ctx`.
    pub fn new(ctx: &EditorContext, mode: PanelMode, transport: T) -> Result<Self> {
        let config = ctx.config().clone();
        let defaults = PanelLayout::default();
        let layout = PanelLayout::new(
            defaults.width,
            defaults.height,
            config.layout.padding,
            config.layout.header,
        );
        let rect = layout.draw_rect(None);

        let (store, diameter, prefix) = match mode {
            PanelMode::Points => (
                AnnotationStore::points(),
                config.brush.point_diameter,
                POINT_MASK_PREFIX,
            ),
            PanelMode::Strokes => {
                let (width, height) = rect.pixel_size();
                (
                    AnnotationStore::strokes(width, height)?,
                    ctx.brush_diameter().unwrap_or(config.brush.stroke_diameter),
                    STROKE_MASK_PREFIX,
                )
            }
        };

        let scheduling = &config.scheduling;
        let overlay = config.overlay.style();
        let mut persistence = MaskPersistence::new(
            prefix,
            ctx.next_panel_sequence(),
            config.upload.polarity.into(),
            scheduling.retry.with_max_retries(config.upload.max_retries),
            scheduling.busy(),
            scheduling.upload_debounce(),
        );
        persistence.set_mask_color(overlay.color.to_hex());

        Ok(Self {
            ctx: ctx.clone(),
            transport,
            layout,
            view: HostView::identity(),
            rect,
            mapper: None,
            record: None,
            had_record: false,
            image: None,
            store,
            mask: None,
            stroke_dirty: false,
            stored_mask: None,
            brush: BrushSettings::new(diameter, config.brush.step, config.brush.coarse_step),
            threshold: config.threshold.clamp(0.0, 1.0),
            overlay,
            session: SegmentationSession::new(
                &config.model,
                scheduling.warmup(),
                scheduling.min_wait(),
            ),
            detect: RequestScheduler::new("detect", scheduling.retry, scheduling.busy()),
            persistence,
            image_loads: TokenCounter::new(),
            mask_loads: TokenCounter::new(),
            image_pending: false,
            mask_pending: false,
            pointer: None,
            drawing: false,
            retired: false,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn mode(&self) -> PanelMode {
        self.store.mode()
    }

    pub fn record(&self) -> Option<&ImageRecord> {
        self.record.as_ref()
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        self.image.as_ref()
    }

    pub fn mask(&self) -> Option<&CanonicalMask> {
        self.mask.as_ref()
    }

    pub fn points(&self) -> Option<&PointSet> {
        self.store.point_set()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn brush_diameter(&self) -> f32 {
        self.brush.diameter()
    }

    pub fn overlay(&self) -> OverlayStyle {
        self.overlay
    }

    /// Label given to the next point added by a click.
    pub fn polarity(&self) -> Option<PointLabel> {
        match &self.store {
            AnnotationStore::Points { polarity, .. } => Some(*polarity),
            AnnotationStore::Strokes(_) => None,
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Storage handle of the last committed upload; empty if none yet.
    pub fn mask_handle(&self) -> &str {
        self.persistence.handle()
    }

    pub fn persisted_state(&self) -> &PersistedMaskState {
        self.persistence.state()
    }

    /// Where the preview goes, in panel-local coordinates.
    pub fn draw_rect(&self) -> Rect {
        self.rect
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// Nothing scheduled, in flight or loading.
    pub fn is_idle(&self) -> bool {
        self.detect.is_idle()
            && self.persistence.is_idle()
            && !self.image_pending
            && !self.mask_pending
            && self.session.state() != SessionState::Preparing
    }

    /// Earliest pending deadline, for hosts that sleep between ticks.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.detect.deadline(), self.persistence.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn status(&self) -> PanelStatus {
        if self.retired {
            return PanelStatus::Idle;
        }
        match self.session.state() {
            SessionState::Preparing => PanelStatus::Preparing,
            SessionState::Failed => PanelStatus::PrepareFailed,
            _ if !self.detect.is_idle() => PanelStatus::Detecting,
            SessionState::Ready => PanelStatus::Ready,
            SessionState::Unprepared => PanelStatus::Idle,
        }
    }

    // ------------------------------------------------------------------
    // Host-driven state
    // ------------------------------------------------------------------

    /// Restore node state saved from an earlier panel. Call before the first
    /// [`MaskPanel::set_source`] so the stored mask is reloaded.
    pub fn restore(&mut self, state: PersistedMaskState) {
        if let Some(color) = Rgb::from_hex(&state.mask_color) {
            self.overlay.color = color;
        }
        self.persistence.restore(state);
    }

    /// Bind the panel to an upstream image.
    ///
    /// A new record drops all points, strokes and the mask, re-prepares the
    /// model and loads the image. The first record also reloads the stored
    /// mask; later ones publish an empty mask instead.
    pub fn set_source(&mut self, record: ImageRecord, now: Instant) {
        if self.retired || self.record.as_ref() == Some(&record) {
            return;
        }
        let first = !self.had_record;
        self.had_record = true;
        log::info!(
            "Source image {:?} (type {}, subfolder {:?})",
            record.filename,
            record.kind,
            record.subfolder
        );

        self.reset_edits();
        self.image = None;
        self.mask = None;
        self.stored_mask = None;
        self.mask_loads.invalidate();
        self.mask_pending = false;
        self.relayout();

        if self.store.mode() == PanelMode::Points {
            let (token, request) = self.session.begin_prepare(&record, now);
            self.transport.submit(Job::Prepare { token, request });
        }

        let token = self.image_loads.issue();
        self.image_pending = true;
        self.transport.submit(Job::LoadImage {
            token,
            request: record.view_request(),
        });

        if first {
            let handle = self.persistence.handle();
            if !handle.is_empty() {
                let request = ViewRequest {
                    filename: handle.to_string(),
                    kind: INPUT_STORAGE_TYPE.to_string(),
                    subfolder: String::new(),
                };
                let token = self.mask_loads.issue();
                self.mask_pending = true;
                self.transport.submit(Job::LoadMask { token, request });
            }
        } else {
            // Fires once the new image is decoded and the empty mask exists.
            self.persistence.request(now);
        }

        self.record = Some(record);
    }

    pub fn set_layout(&mut self, layout: PanelLayout) {
        if self.layout == layout {
            return;
        }
        self.layout = layout;
        self.relayout();
    }

    pub fn set_host_view(&mut self, view: HostView) {
        self.view = view;
    }

    /// Change the model selector. Points are cleared and the model is
    /// re-prepared on the current image. Stroke panels never segment.
    pub fn set_model(&mut self, model: &str, now: Instant) {
        if self.retired || !self.session.set_model(model) {
            return;
        }
        let AnnotationStore::Points { points, .. } = &mut self.store else {
            return;
        };
        points.clear();
        self.detect.cancel();
        self.detect.invalidate();

        if let Some(record) = self.session.bound().cloned() {
            let (token, request) = self.session.begin_prepare(&record, now);
            self.transport.submit(Job::Prepare { token, request });
        }
    }

    /// Set the detection threshold and re-detect immediately.
    pub fn set_threshold(&mut self, threshold: f32, now: Instant) {
        let threshold = threshold.clamp(0.0, 1.0);
        if threshold == self.threshold {
            return;
        }
        self.threshold = threshold;
        log::debug!("Threshold set to {:.2}", threshold);
        if self.store.point_set().is_some_and(|p| !p.is_empty()) {
            self.detect.invalidate();
            self.detect.trigger(now, Duration::ZERO);
        }
    }

    pub fn set_overlay(&mut self, overlay: OverlayStyle) {
        self.overlay = overlay;
        self.persistence.set_mask_color(overlay.color.to_hex());
    }

    pub fn set_polarity(&mut self, label: PointLabel) {
        if let AnnotationStore::Points { polarity, .. } = &mut self.store {
            *polarity = label;
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Append a point (image pixel coordinates) and schedule detection.
    pub fn add_point(&mut self, point: Point, now: Instant) {
        if self.retired {
            return;
        }
        if let Some(image) = &self.image {
            if !ImageSize::new(image.width(), image.height()).contains(point.x, point.y) {
                log::warn!("Ignoring point ({}, {}) outside the image", point.x, point.y);
                return;
            }
        }
        let AnnotationStore::Points { points, .. } = &mut self.store else {
            return;
        };
        points.push(point);
        log::debug!(
            "Point added ({}, {}, {}), {} total",
            point.x,
            point.y,
            point.label.symbol(),
            points.len()
        );
        self.detect.invalidate();
        self.detect.trigger(now, self.config.scheduling.add_point());
    }

    /// Remove the point nearest to `(x, y)`. Removing the last point clears
    /// the mask and publishes it empty.
    pub fn remove_nearest(&mut self, x: i32, y: i32, now: Instant) -> Option<Point> {
        if self.retired {
            return None;
        }
        let AnnotationStore::Points { points, .. } = &mut self.store else {
            return None;
        };
        let removed = points.remove_nearest(x, y)?;
        let now_empty = points.is_empty();
        log::debug!("Point removed ({}, {})", removed.x, removed.y);

        self.detect.invalidate();
        if now_empty {
            self.detect.cancel();
            if let Some(mask) = self.mask.as_mut() {
                mask.clear();
            }
            self.persistence.request(now);
        } else {
            self.detect.trigger(now, self.config.scheduling.remove_point());
        }
        Some(removed)
    }

    /// Drop all points and the mask derived from them. The stored mask is
    /// left alone.
    pub fn clear_points(&mut self) {
        let AnnotationStore::Points { points, .. } = &mut self.store else {
            return;
        };
        points.clear();
        self.detect.cancel();
        self.detect.invalidate();
        if let Some(mask) = self.mask.as_mut() {
            mask.clear();
        }
    }

    /// Clear points, strokes and the mask, and publish an explicit empty mask.
    pub fn clear_mask(&mut self, now: Instant) {
        if self.retired {
            return;
        }
        self.reset_edits();
        if let Some(mask) = self.mask.as_mut() {
            mask.clear();
        }
        self.persistence.request(now);
    }

    /// Upload the current mask now.
    pub fn save_mask(&mut self, now: Instant) {
        if self.retired {
            return;
        }
        self.sync_strokes();
        self.persistence.request(now);
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed one host event. Returns whether the preview should be redrawn.
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> bool {
        if self.retired {
            return false;
        }
        if let EventKind::Key(key) = event.kind {
            return self.handle_key(key, now);
        }

        let (px, py) = self.view.to_panel(event.x, event.y);
        if event.kind == EventKind::Leave {
            self.pointer = None;
            if self.drawing {
                self.finish_stroke(now);
            }
            return true;
        }
        self.pointer = Some((px, py));

        if let EventKind::Wheel { delta } = event.kind {
            return self.handle_wheel(delta, event.modifiers, px, py, now);
        }

        match self.store.mode() {
            PanelMode::Points => self.handle_point_input(&event, px, py, now),
            PanelMode::Strokes => self.handle_stroke_input(&event, px, py, now),
        }
    }

    fn handle_point_input(&mut self, event: &InputEvent, px: f32, py: f32, now: Instant) -> bool {
        let EventKind::Down(button) = event.kind else {
            return event.kind == EventKind::Move;
        };
        let Some(mapper) = self.mapper else {
            return false;
        };
        if !self.rect.contains(px, py) {
            return false;
        }
        let (x, y) = mapper.to_image(px, py);
        let m = event.modifiers;

        match button {
            MouseButton::Right => {
                self.remove_nearest(x, y, now);
                true
            }
            MouseButton::Left if m.shift || m.alt || m.command() => {
                self.remove_nearest(x, y, now);
                true
            }
            MouseButton::Left => {
                let label = self.polarity().unwrap_or_default();
                self.add_point(Point::new(x, y, label), now);
                true
            }
            MouseButton::Middle => false,
        }
    }

    fn handle_stroke_input(&mut self, event: &InputEvent, px: f32, py: f32, now: Instant) -> bool {
        let (lx, ly) = (px - self.rect.x, py - self.rect.y);
        let diameter = self.brush.diameter();

        match event.kind {
            EventKind::Down(button) => {
                if self.image.is_none() || button == MouseButton::Middle {
                    return false;
                }
                if !self.rect.contains(px, py) {
                    return false;
                }
                let op = brush_op(
                    button == MouseButton::Right || event.buttons.right,
                    event.modifiers.shift,
                );
                if let Some(buffer) = self.store.stroke_buffer_mut() {
                    buffer.stamp(lx, ly, diameter, op);
                }
                self.drawing = true;
                self.stroke_dirty = true;
                true
            }
            EventKind::Move => {
                if !self.drawing {
                    return true;
                }
                if !event.buttons.any() {
                    // Release happened where we couldn't see it.
                    self.finish_stroke(now);
                    return true;
                }
                let op = brush_op(event.buttons.right, event.modifiers.shift);
                if let Some(buffer) = self.store.stroke_buffer_mut() {
                    buffer.line_to(lx, ly, diameter, op);
                }
                self.stroke_dirty = true;
                true
            }
            EventKind::Up(_) => {
                if !self.drawing {
                    return false;
                }
                self.finish_stroke(now);
                true
            }
            _ => false,
        }
    }

    fn handle_wheel(&mut self, delta: f32, modifiers: Modifiers, px: f32, py: f32, now: Instant) -> bool {
        if delta == 0.0 || !self.layout.contains(px, py) {
            return false;
        }
        if self.store.mode() == PanelMode::Points && modifiers.command() {
            self.set_threshold(self.threshold + THRESHOLD_STEP * delta.signum(), now);
            return true;
        }

        let diameter = self.brush.adjust(delta, modifiers.ctrl);
        if self.store.mode() == PanelMode::Strokes {
            self.ctx.set_brush_diameter(diameter);
        }
        log::debug!("Brush diameter {}", diameter);
        true
    }

    fn handle_key(&mut self, key: Key, now: Instant) -> bool {
        if self.store.mode() != PanelMode::Points {
            return false;
        }
        match key {
            Key::Char('+') | Key::Char('=') => {
                self.set_polarity(PointLabel::Positive);
                true
            }
            Key::Char('-') => {
                self.set_polarity(PointLabel::Negative);
                true
            }
            Key::Delete | Key::Backspace => {
                let (Some((px, py)), Some(mapper)) = (self.pointer, self.mapper) else {
                    return false;
                };
                let (x, y) = mapper.to_image(px, py);
                self.remove_nearest(x, y, now).is_some()
            }
            _ => false,
        }
    }

    fn finish_stroke(&mut self, now: Instant) {
        self.drawing = false;
        if let Some(buffer) = self.store.stroke_buffer_mut() {
            buffer.end_stroke();
        }
        self.sync_strokes();
        self.persistence.request(now);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Drain finished jobs and send whatever is due. Returns whether the
    /// preview should be redrawn.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.retired {
            while self.transport.try_take().is_some() {}
            return false;
        }

        let mut changed = false;
        while let Some(completion) = self.transport.try_take() {
            changed |= self.on_completion(completion, now);
        }
        self.poll_detect(now);
        self.poll_upload(now);
        changed
    }

    fn poll_detect(&mut self, now: Instant) {
        if self.detect.poll(now) != Tick::Ready {
            return;
        }
        let request = match self.store.point_set() {
            Some(points) if !points.is_empty() => {
                self.session.detect_request(points, self.threshold)
            }
            _ => return,
        };

        match self.session.detect_gate(now) {
            DetectGate::NotPrepared => {
                log::debug!("Detect requested with no image bound");
                return;
            }
            DetectGate::Warmup(wait) => {
                log::debug!("Waiting {} ms for the model to load", wait.as_millis());
                self.detect.schedule(now, wait);
                return;
            }
            DetectGate::Proceed => {}
        }
        if self.session.state() == SessionState::Failed {
            log::warn!("Prepare failed; attempting detect anyway");
        }

        let token = self.detect.begin();
        log::info!(
            "Detecting with {} positive / {} negative points ({})",
            request.positive_points.len(),
            request.negative_points.len(),
            token
        );
        self.transport.submit(Job::Detect { token, request });
    }

    fn poll_upload(&mut self, now: Instant) {
        if !self.drawing {
            self.sync_strokes();
        }
        let Some(mask) = self.mask.as_ref() else {
            return;
        };
        if let Some((token, request)) = self.persistence.poll(now, mask) {
            self.transport.submit(Job::Upload { token, request });
        }
    }

    fn on_completion(&mut self, completion: Completion, now: Instant) -> bool {
        match completion {
            Completion::Prepared { token, result } => {
                if let Err(e) = &result {
                    log::warn!("Prepare {} failed: {}", token, e);
                }
                self.session.finish_prepare(token, result.is_ok())
            }
            Completion::Detected { token, result } => self.on_detected(token, result, now),
            Completion::Uploaded { token, result } => {
                self.persistence.finish(token, result, now).is_some()
            }
            Completion::ImageLoaded { token, result } => self.on_image_loaded(token, result),
            Completion::MaskLoaded { token, result } => self.on_mask_loaded(token, result),
        }
    }

    fn on_detected(
        &mut self,
        token: RequestToken,
        result: std::result::Result<Vec<u8>, ServiceError>,
        now: Instant,
    ) -> bool {
        if !self.detect.is_current(token) {
            self.detect.finish(token, false, now);
            return false;
        }

        let bitmap = result.map_err(|e| e.to_string()).and_then(|bytes| {
            image::load_from_memory(&bytes).map_err(|e| format!("undecodable mask: {}", e))
        });

        match self.detect.finish(token, bitmap.is_ok(), now) {
            Disposition::Commit => {
                let Ok(bitmap) = bitmap else {
                    return false;
                };
                let Some(mask) = self.mask.as_mut() else {
                    log::warn!("Detection {} arrived before the image; dropped", token);
                    return false;
                };
                mask.import_detection(&bitmap, self.threshold);
                log::info!(
                    "Detection {} applied ({}x{} bitmap)",
                    token,
                    bitmap.width(),
                    bitmap.height()
                );
                self.persistence.request(now);
                true
            }
            Disposition::Retry(delay) => {
                if let Err(e) = &bitmap {
                    log::warn!(
                        "Detect {} failed: {}; retrying in {} ms",
                        token,
                        e,
                        delay.as_millis()
                    );
                }
                false
            }
            Disposition::Exhausted => {
                log::warn!("Detect failed; waiting for the next edit");
                false
            }
            Disposition::Stale => false,
        }
    }

    fn on_image_loaded(
        &mut self,
        token: RequestToken,
        result: std::result::Result<Vec<u8>, ServiceError>,
    ) -> bool {
        if !self.image_loads.is_current(token) {
            log::debug!("Ignoring stale image load {}", token);
            return false;
        }
        self.image_loads.invalidate();
        self.image_pending = false;

        let image = match result
            .map_err(|e| e.to_string())
            .and_then(|bytes| ImageHandle::decode(&bytes).map_err(|e| e.to_string()))
        {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to load source image: {}", e);
                return false;
            }
        };

        log::info!("Source image loaded: {}x{}", image.width(), image.height());
        self.mask = Some(CanonicalMask::new(image.width(), image.height()));
        self.image = Some(image);
        self.relayout();

        if let Some(stored) = self.stored_mask.take() {
            self.restore_mask(&stored);
        }
        true
    }

    fn on_mask_loaded(
        &mut self,
        token: RequestToken,
        result: std::result::Result<Vec<u8>, ServiceError>,
    ) -> bool {
        if !self.mask_loads.is_current(token) {
            log::debug!("Ignoring stale mask load {}", token);
            return false;
        }
        self.mask_loads.invalidate();
        self.mask_pending = false;

        let stored = match result
            .map_err(|e| e.to_string())
            .and_then(|bytes| image::load_from_memory(&bytes).map_err(|e| e.to_string()))
        {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Failed to load stored mask {:?}: {}", self.mask_handle(), e);
                return false;
            }
        };

        if self.mask.is_some() {
            self.restore_mask(&stored);
            true
        } else {
            self.stored_mask = Some(stored);
            false
        }
    }

    fn restore_mask(&mut self, stored: &DynamicImage) {
        let Some(mask) = self.mask.as_mut() else {
            return;
        };
        mask.import_stored(stored);
        if let Some(buffer) = self.store.stroke_buffer_mut() {
            buffer.load_alpha(mask.alpha());
        }
        self.stroke_dirty = false;
        log::info!("Restored stored mask {:?}", self.persistence.handle());
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render the preview at draw-rect size. Place it at [`MaskPanel::draw_rect`].
    pub fn render(&mut self) -> Option<Pixmap> {
        if self.retired {
            return None;
        }
        self.sync_strokes();

        let (width, height) = self.rect.pixel_size();
        let markers: Vec<PointMarker> = self
            .store
            .point_set()
            .map(|points| {
                points
                    .iter()
                    .map(|p| PointMarker {
                        x: p.x as f32,
                        y: p.y as f32,
                        color: p.label.color(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rect = self.rect;
        let cursor = self
            .pointer
            .filter(|&(x, y)| rect.contains(x, y))
            .map(|(x, y)| BrushCursor {
                x: x - rect.x,
                y: y - rect.y,
                diameter: self.brush.diameter(),
                color: self.cursor_color(),
            });

        let scene = PreviewScene {
            width,
            height,
            image: self.image.as_ref(),
            mask: self.mask.as_ref(),
            overlay: self.overlay,
            markers: &markers,
            cursor,
        };
        match render_preview(&scene) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::error!("Preview render failed: {}", e);
                None
            }
        }
    }

    fn cursor_color(&self) -> Rgb {
        match self.polarity() {
            Some(label) => label.color(),
            None => Rgb::WHITE,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Detach the panel: clear timers, make every outstanding token stale and
    /// release the buffers. Later events, ticks and completions do nothing.
    pub fn teardown(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        self.detect.retire();
        self.persistence.retire();
        self.session.retire();
        self.image_loads.retire();
        self.mask_loads.retire();

        self.store.clear();
        self.image = None;
        self.mask = None;
        self.mapper = None;
        self.stored_mask = None;
        self.pointer = None;
        self.drawing = false;
        self.image_pending = false;
        self.mask_pending = false;
        log::debug!("Panel torn down");
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn reset_edits(&mut self) {
        self.store.clear();
        self.drawing = false;
        self.stroke_dirty = false;
        self.detect.cancel();
        self.detect.invalidate();
    }

    /// Write the stroke buffer into the canonical mask if it changed.
    fn sync_strokes(&mut self) {
        if !self.stroke_dirty {
            return;
        }
        if let (Some(mask), Some(buffer)) = (self.mask.as_mut(), self.store.stroke_buffer()) {
            mask.apply_stroke(buffer);
        }
        self.stroke_dirty = false;
    }

    /// Recompute the draw rect and resize rect-resolution buffers.
    fn relayout(&mut self) {
        let size = self
            .image
            .as_ref()
            .map(|image| ImageSize::new(image.width(), image.height()));
        let rect = self.layout.draw_rect(size);
        self.rect = rect;
        self.mapper = size.map(|size| SpaceMapper::new(rect, size));

        if let Some(buffer) = self.store.stroke_buffer_mut() {
            let (width, height) = rect.pixel_size();
            if let Err(e) = buffer.resize(width, height) {
                log::error!("Failed to resize stroke buffer: {}", e);
            }
        }
    }
}
