#![forbid(unsafe_code)]

//! Bottom sheets that size themselves to their content.
//!
//! The sheet slides up from the bottom edge, follows the user's drag, and
//! either snaps back or dismisses on release. On platforms with native
//! detents the host's own sheet is configured instead; everywhere else the
//! gesture-driven [`BottomSheet`] is hosted in a non-animated modal.

pub mod color;
pub mod geometry;
pub mod measure;
#[cfg(feature = "policy-config")]
pub mod policy;
pub mod sheet;

pub use color::Rgba;
pub use geometry::{HitRegion, Point, Rect, Size, SizeProposal};
pub use measure::{GeometryProbe, GeometryReader, Measurable};
#[cfg(feature = "policy-config")]
pub use policy::{PolicyError, SheetPolicy};
pub use sheet::{
    BottomSheet, ConfigContext, PlatformCapabilities, PresentOptions, SheetConfiguration,
    SheetEvent, SheetMetrics, SheetPresentation, SheetPresenter,
};
