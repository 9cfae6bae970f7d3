//! masksync - interactive mask editing kept in sync with a remote
//! segmentation and storage service.
//!
//! A [`MaskPanel`] is bound to one upstream image. Users either click
//! positive/negative points (which are sent to the segmentation model and
//! come back as a mask) or paint freehand strokes. Either way the result
//! lands in one canonical image-resolution mask that is uploaded as a PNG,
//! and the returned storage handle is kept in [`PersistedMaskState`].
//!
//! The panel is single-threaded and never blocks: service calls run behind a
//! [`Transport`] and every request carries a token so late responses cannot
//! overwrite newer state.

pub mod annotation;
pub mod config;
pub mod constants;
pub mod error;
pub mod input;
pub mod panel;
pub mod persistence;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod space;
pub mod token;
pub mod transport;

pub use annotation::{PanelMode, Point, PointLabel};
pub use config::{AppConfig, EditorContext, PanelConfig};
pub use error::{Error, Result, ServiceError};
pub use input::{EventKind, InputEvent, Key, Modifiers, MouseButton};
pub use panel::{MaskPanel, PanelStatus};
pub use persistence::PersistedMaskState;
pub use service::{HttpMaskService, MaskService};
pub use session::ImageRecord;
pub use space::{HostView, PanelLayout};
pub use transport::{ThreadedTransport, Transport};
