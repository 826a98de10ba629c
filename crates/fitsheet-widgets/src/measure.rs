#![forbid(unsafe_code)]

//! Geometry feedback: report a subtree's rendered height to its parent.
//!
//! A [`GeometryReader`] overlays a zero-footprint [`GeometryProbe`] on its
//! content. After each layout pass the probe publishes the content's height
//! into an [`Observable<f32>`], and whoever subscribes (the sheet engine, a
//! native height-detent request) re-lays out with that value.
//!
//! # Invariants
//!
//! 1. The reader returns exactly the size its content measured; the probe
//!    contributes nothing to layout and is never constrained by the value it
//!    reports, so the child→parent flow cannot form a layout cycle.
//! 2. Last write wins: the most recent report replaces the previous one,
//!    whichever subtree it came from. Nothing accumulates.
//! 3. Reporting an unchanged height is a no-op (no notification).
//!
//! # Failure Modes
//!
//! - Negative or non-finite heights are reported as `0.0`.

use fitsheet_runtime::{Observable, Subscription};

use crate::geometry::{Size, SizeProposal};

/// Something the host can measure.
///
/// This is the host framework's geometry capability as the sheet sees it:
/// given a proposal, return the size the subtree would render at.
pub trait Measurable {
    fn measure(&self, proposal: SizeProposal) -> Size;
}

impl<M: Measurable + ?Sized> Measurable for &M {
    fn measure(&self, proposal: SizeProposal) -> Size {
        (**self).measure(proposal)
    }
}

impl<M: Measurable + ?Sized> Measurable for std::rc::Rc<M> {
    fn measure(&self, proposal: SizeProposal) -> Size {
        (**self).measure(proposal)
    }
}

/// Zero-footprint probe that publishes measured heights.
#[derive(Debug, Clone)]
pub struct GeometryProbe {
    height: Observable<f32>,
}

impl Default for GeometryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryProbe {
    /// A probe with no reading yet (height `0.0`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            height: Observable::new(0.0),
        }
    }

    /// A probe publishing into an existing observable.
    #[must_use]
    pub fn with_sink(height: Observable<f32>) -> Self {
        Self { height }
    }

    /// The probe takes no space in the layout it observes.
    #[must_use]
    pub fn footprint(&self) -> Size {
        Size::ZERO
    }

    /// Latest reported height.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.height.get()
    }

    /// Observable carrying the latest reported height.
    #[must_use]
    pub fn reading(&self) -> Observable<f32> {
        self.height.clone()
    }

    /// Publish a measured size.
    pub fn report(&self, size: Size) {
        let height = sanitize(size.height);
        if self.height.get() != height {
            tracing::trace!(height, "geometry probe reading changed");
        }
        self.height.set(height);
    }

    /// Run `callback` whenever the reported height changes.
    #[must_use = "dropping the subscription stops height updates"]
    pub fn on_change(&self, callback: impl Fn(f32) + 'static) -> Subscription {
        self.height.subscribe(move |h| callback(*h))
    }
}

fn sanitize(height: f32) -> f32 {
    if height.is_finite() && height > 0.0 {
        height
    } else {
        0.0
    }
}

/// Wraps content and reports its measured height through a probe.
#[derive(Debug, Clone)]
pub struct GeometryReader<C> {
    content: C,
    probe: GeometryProbe,
}

impl<C: Measurable> GeometryReader<C> {
    #[must_use]
    pub fn new(content: C, probe: GeometryProbe) -> Self {
        Self { content, probe }
    }

    /// Measure the content, report it, and return the content's own size.
    pub fn layout(&self, proposal: SizeProposal) -> Size {
        let size = self.content.measure(proposal);
        self.probe.report(size);
        // Overlay: the probe footprint never widens or heightens the result.
        let overlay = self.probe.footprint();
        Size::new(size.width.max(overlay.width), size.height.max(overlay.height))
    }

    #[must_use]
    pub fn probe(&self) -> &GeometryProbe {
        &self.probe
    }

    #[must_use]
    pub fn content(&self) -> &C {
        &self.content
    }
}

impl<C: Measurable> Measurable for GeometryReader<C> {
    fn measure(&self, proposal: SizeProposal) -> Size {
        self.layout(proposal)
    }
}
