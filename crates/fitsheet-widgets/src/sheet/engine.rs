#![forbid(unsafe_code)]

//! Drag & offset engine for the gesture-driven bottom sheet.
//!
//! The sheet is a vertical stack (drag indicator, content, bottom padding)
//! bottom-aligned in its container and pushed down by an animated offset:
//!
//! ```text
//! shown:  offset = bottom_padding + max(translation, -max_over_drag)
//! hidden: offset = content_height + bottom_padding
//! ```
//!
//! `content_height` is the stack height reported through Geometry Feedback
//! on every layout pass, so the padding always sits below the screen edge
//! at rest and the whole stack is off-screen when hidden.
//!
//! A drag is not a state of its own: samples deform the shown offset
//! directly, and gesture end either releases the sheet back to rest or
//! dismisses it when the downward translation exceeds
//! `(content_height - bottom_padding) * dismiss_ratio`.
//!
//! # State Machine
//!
//! ```text
//! Hidden --show hop--> Shown --dismiss--> Dismissing --teardown--> Dismissed
//!    \______________________dismiss______________^           |
//!                                                            v
//!                                         (flag set true) show hop again
//! ```
//!
//! # Invariants
//!
//! 1. The show transition never happens synchronously with `mount`; it
//!    waits one main-loop turn so the hidden state is rendered first.
//! 2. Dismiss triggers while `Dismissing` attach to the in-flight dismissal;
//!    every completion runs exactly once.
//! 3. Completions run before the external flag is cleared.
//! 4. An external flag change to `false` always goes through the animated
//!    dismiss path.
//! 5. Drag input is ignored outside `Shown`; translation is reset at every
//!    gesture end.
//!
//! # Failure Modes
//!
//! - Non-finite translations are ignored (changed) or treated as zero (end).
//! - An unmeasured sheet (height `0`) has a zero dismiss threshold, so any
//!   downward release dismisses.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fitsheet_runtime::{MainLoop, Observable, Subscription, TaskId};
use tracing::{debug, debug_span, trace};

use crate::color::Rgba;
use crate::geometry::{HitRegion, Point, Rect, Size, SizeProposal};
use crate::measure::{GeometryProbe, GeometryReader, Measurable};
use crate::sheet::animation::{AnimatedValue, DismissTiming};
use crate::sheet::config::{
    BehaviorOverride, ConfigContext, DragIndicator, SheetBackground, SheetConfiguration, SheetMetrics,
};

/// Hit region tag for the dimmed backdrop.
pub const SHEET_HIT_BACKDROP: HitRegion = HitRegion::Custom(1);
/// Hit region tag for the sheet surface.
pub const SHEET_HIT_CONTENT: HitRegion = HitRegion::Custom(2);

/// Callback run once a dismissal has fully played out.
pub type DismissCompletion = Box<dyn FnOnce()>;

/// A presented view that can animate itself away.
pub trait DismissableView {
    /// Start (or join) the animated dismissal; `completion` runs once the
    /// view is fully invisible, before its presentation flag is cleared.
    fn dismiss(&self, completion: Option<DismissCompletion>);
}

// ---------------------------------------------------------------------------
// Events, actions, phases
// ---------------------------------------------------------------------------

/// Input delivered by the host's gesture recognizers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetEvent {
    /// Vertical drag sample (positive is downward).
    DragChanged { translation: f32 },
    /// Gesture ended with its final translation.
    DragEnded { translation: f32 },
    /// Tap at container-relative `y`.
    Tap { y: f32 },
    /// System back / escape.
    Cancel,
}

/// Why a dismissal started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    /// The presentation flag was cleared by the host application.
    External,
    Backdrop,
    Drag,
    Cancel,
    /// [`DismissableView::dismiss`] called directly.
    Programmatic,
}

/// Outcome of [`BottomSheet::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetAction {
    /// A dismissal started.
    Dismiss(DismissReason),
    /// A drag was released below the threshold; the sheet returns to rest.
    SnapBack,
    /// User dismissal is disabled and the request was refused.
    DismissBlocked,
}

/// Lifecycle phase of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetPhase {
    /// Mounted (or not yet) and off-screen.
    Hidden,
    /// On-screen or animating in; drags are live.
    Shown,
    /// Exit animation playing; teardown pending.
    Dismissing,
    /// Torn down; the flag has been cleared.
    Dismissed,
}

// ---------------------------------------------------------------------------
// Layout output
// ---------------------------------------------------------------------------

/// Geometry and render descriptors for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub container: Rect,
    /// Whole stack (indicator, content, padding) at the current offset.
    pub sheet: Rect,
    pub indicator: Option<Rect>,
    pub content: Rect,
    pub offset: f32,
    /// Dim color with the animated opacity applied.
    pub dim: Rgba,
    pub dim_opacity: f32,
    pub background: SheetBackground,
    pub indicator_style: DragIndicator,
}

impl SheetLayout {
    /// Classify a container-relative point.
    #[must_use]
    pub fn hit_test(&self, point: Point) -> HitRegion {
        if !self.container.contains(point) {
            HitRegion::None
        } else if self.sheet.contains(point) {
            SHEET_HIT_CONTENT
        } else {
            SHEET_HIT_BACKDROP
        }
    }
}

/// Indicator, content, and padding measured as one unit.
struct SheetStack {
    content: Rc<dyn Measurable>,
    indicator: DragIndicator,
    bottom_padding: f32,
    max_content_height: f32,
    last_content: Cell<Size>,
}

impl Measurable for SheetStack {
    fn measure(&self, proposal: SizeProposal) -> Size {
        let width = proposal.width.unwrap_or(0.0).max(0.0);
        let natural = self.content.measure(SizeProposal::width(width));
        let height = if natural.height.is_finite() {
            natural.height.clamp(0.0, self.max_content_height)
        } else {
            0.0
        };
        self.last_content.set(Size::new(width, height));
        Size::new(
            width,
            self.indicator.stack_height() + height + self.bottom_padding,
        )
    }
}

// ---------------------------------------------------------------------------
// BottomSheet
// ---------------------------------------------------------------------------

struct SheetInner {
    main: MainLoop,
    is_shown: Observable<bool>,
    content: Rc<dyn Measurable>,
    explicit: Option<SheetConfiguration>,
    behavior: BehaviorOverride,
    context: ConfigContext,
    metrics: SheetMetrics,
    probe: GeometryProbe,
    phase: SheetPhase,
    visually_shown: bool,
    translation: f32,
    container: Option<Size>,
    offset: AnimatedValue,
    dim: AnimatedValue,
    completions: Vec<DismissCompletion>,
    show_task: Option<TaskId>,
    frame_task: Option<TaskId>,
    teardown_task: Option<TaskId>,
    flag_watch: Option<Subscription>,
}

impl SheetInner {
    fn config(&self) -> SheetConfiguration {
        self.context.resolve_with(self.explicit.as_ref(), self.behavior)
    }

    fn content_height(&self) -> f32 {
        self.probe.height()
    }

    fn target_offset(&self, config: &SheetConfiguration) -> f32 {
        let pad = self.metrics.bottom_padding;
        if self.visually_shown {
            pad + self.translation.max(-config.max_over_drag)
        } else {
            self.content_height() + pad
        }
    }

    fn dismiss_threshold(&self, config: &SheetConfiguration) -> f32 {
        ((self.content_height() - self.metrics.bottom_padding) * config.dismiss_ratio).max(0.0)
    }

    /// Point the offset animation at the current target. Returns `true` if
    /// frames are needed.
    fn retarget(&mut self, now: std::time::Duration) -> bool {
        let config = self.config();
        let target = self.target_offset(&config);
        if (target - self.offset.target()).abs() > f32::EPSILON {
            match self.phase {
                // Off-screen: follow the measurement without animating.
                SheetPhase::Hidden | SheetPhase::Dismissed => self.offset.snap_to(target, now),
                SheetPhase::Shown | SheetPhase::Dismissing => self.offset.animate_to(target, now),
            }
        }
        !(self.offset.is_settled(now) && self.dim.is_settled(now))
    }

    fn hit_test_y(&self, y: f32, now: std::time::Duration) -> HitRegion {
        let Some(container) = self.container else {
            return HitRegion::None;
        };
        if !(0.0..container.height).contains(&y) {
            return HitRegion::None;
        }
        let top = container.height - self.content_height() + self.offset.value_at(now);
        if y >= top {
            SHEET_HIT_CONTENT
        } else {
            SHEET_HIT_BACKDROP
        }
    }
}

/// Gesture-driven bottom sheet.
///
/// Cloning yields another handle to the same sheet. Tasks scheduled on the
/// main loop hold the sheet weakly, so dropping every handle cancels all
/// pending work (unfinished completions are dropped without running).
#[derive(Clone)]
pub struct BottomSheet {
    inner: Rc<RefCell<SheetInner>>,
    main: MainLoop,
    is_shown: Observable<bool>,
}

impl std::fmt::Debug for BottomSheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("BottomSheet")
            .field("phase", &inner.phase)
            .field("visually_shown", &inner.visually_shown)
            .field("translation", &inner.translation)
            .field("content_height", &inner.content_height())
            .finish_non_exhaustive()
    }
}

impl BottomSheet {
    /// Create a sheet bound to `is_shown`, hosting `content`.
    ///
    /// Nothing is scheduled until [`BottomSheet::mount`].
    pub fn new(
        is_shown: Observable<bool>,
        main: MainLoop,
        content: impl Measurable + 'static,
    ) -> Self {
        Self::from_shared(is_shown, main, Rc::new(content))
    }

    /// Like [`BottomSheet::new`] with content already behind an `Rc`.
    pub fn from_shared(
        is_shown: Observable<bool>,
        main: MainLoop,
        content: Rc<dyn Measurable>,
    ) -> Self {
        let metrics = SheetMetrics::default();
        let inner = SheetInner {
            main: main.clone(),
            is_shown: is_shown.clone(),
            content,
            explicit: None,
            behavior: BehaviorOverride::NONE,
            context: ConfigContext::global(),
            metrics,
            probe: GeometryProbe::new(),
            phase: SheetPhase::Hidden,
            visually_shown: false,
            translation: 0.0,
            container: None,
            offset: AnimatedValue::new(metrics.bottom_padding, metrics.spring),
            dim: AnimatedValue::new(0.0, metrics.spring),
            completions: Vec::new(),
            show_task: None,
            frame_task: None,
            teardown_task: None,
            flag_watch: None,
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
            main,
            is_shown,
        }
    }

    /// Set the explicit configuration (overridden by the ambient one).
    #[must_use]
    pub fn configuration(self, config: SheetConfiguration) -> Self {
        self.inner.borrow_mut().explicit = Some(config);
        self
    }

    /// Pin per-presentation flags over every configuration tier.
    #[must_use]
    pub fn behavior(self, behavior: BehaviorOverride) -> Self {
        self.inner.borrow_mut().behavior = behavior;
        self
    }

    /// Resolve the ambient configuration through `context` instead of the
    /// thread-local global.
    #[must_use]
    pub fn context(self, context: ConfigContext) -> Self {
        self.inner.borrow_mut().context = context;
        self
    }

    #[must_use]
    pub fn metrics(self, metrics: SheetMetrics) -> Self {
        {
            let mut inner = self.inner.borrow_mut();
            inner.offset.set_curve(metrics.spring);
            inner.dim.set_curve(metrics.spring);
            let now = inner.main.now();
            if inner.phase == SheetPhase::Hidden {
                let hidden = inner.content_height() + metrics.bottom_padding;
                inner.offset.snap_to(hidden, now);
            }
            inner.metrics = metrics;
        }
        self
    }

    /// Publish measured stack heights into `probe` as well.
    #[must_use]
    pub fn probe_into(self, probe: GeometryProbe) -> Self {
        self.inner.borrow_mut().probe = probe;
        self
    }

    fn downgrade(&self) -> Weak<RefCell<SheetInner>> {
        Rc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<RefCell<SheetInner>>) -> Option<Self> {
        let inner = weak.upgrade()?;
        let (main, is_shown) = {
            let borrowed = inner.borrow();
            (borrowed.main.clone(), borrowed.is_shown.clone())
        };
        Some(Self {
            inner,
            main,
            is_shown,
        })
    }

    // -- lifecycle ---------------------------------------------------------

    /// Start observing the presentation flag and, if it is set, schedule
    /// the show transition for the next turn. Mounting twice is a no-op.
    pub fn mount(&self) {
        if self.inner.borrow().flag_watch.is_some() {
            return;
        }
        let weak = self.downgrade();
        let watch = self.is_shown.subscribe(move |shown| {
            if let Some(sheet) = Self::upgrade(&weak) {
                sheet.on_flag_changed(*shown);
            }
        });
        self.inner.borrow_mut().flag_watch = Some(watch);
        debug!(shown = self.is_shown.get(), "bottom sheet mounted");
        if self.is_shown.get() {
            self.schedule_show();
        }
    }

    /// Whether [`BottomSheet::mount`] has run.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.borrow().flag_watch.is_some()
    }

    fn on_flag_changed(&self, shown: bool) {
        if shown {
            let phase = self.inner.borrow().phase;
            if matches!(phase, SheetPhase::Hidden | SheetPhase::Dismissed) {
                self.schedule_show();
            }
        } else {
            self.dismiss_with(DismissReason::External, None);
        }
    }

    fn schedule_show(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.show_task.is_some() {
            return;
        }
        let weak = self.downgrade();
        let task = self.main.post(move || {
            if let Some(sheet) = Self::upgrade(&weak) {
                sheet.show();
            }
        });
        inner.show_task = Some(task);
        trace!(task = task.id(), "show hop scheduled");
    }

    fn show(&self) {
        let now = self.main.now();
        let animating = {
            let mut inner = self.inner.borrow_mut();
            inner.show_task = None;
            if !matches!(inner.phase, SheetPhase::Hidden | SheetPhase::Dismissed)
                || !self.is_shown.get()
            {
                return;
            }
            inner.phase = SheetPhase::Shown;
            inner.visually_shown = true;
            inner.translation = 0.0;
            let config = inner.config();
            let rest = inner.target_offset(&config);
            inner.offset.animate_to(rest, now);
            inner.dim.animate_to(1.0, now);
            debug!(rest, content_height = inner.content_height(), "sheet showing");
            !inner.offset.is_settled(now) || !inner.dim.is_settled(now)
        };
        if animating {
            self.ensure_frames();
        }
    }

    /// Start (or join) a dismissal.
    ///
    /// Returns `true` if this call started a new dismissal. When the sheet
    /// is already dismissed, `completion` runs immediately.
    pub fn dismiss_with(&self, reason: DismissReason, completion: Option<DismissCompletion>) -> bool {
        let now = self.main.now();
        let immediate = {
            let mut inner = self.inner.borrow_mut();
            match inner.phase {
                SheetPhase::Dismissing => {
                    trace!(?reason, "dismiss joined in-flight dismissal");
                    inner.completions.extend(completion);
                    return false;
                }
                SheetPhase::Dismissed if inner.show_task.is_none() => completion,
                SheetPhase::Hidden | SheetPhase::Shown | SheetPhase::Dismissed => {
                    if let Some(task) = inner.show_task.take() {
                        self.main.cancel(task);
                    }
                    inner.phase = SheetPhase::Dismissing;
                    inner.visually_shown = false;
                    inner.translation = 0.0;
                    let config = inner.config();
                    let hidden = inner.target_offset(&config);
                    inner.offset.animate_to(hidden, now);
                    inner.dim.animate_to(0.0, now);
                    inner.completions.extend(completion);
                    if let DismissTiming::FixedDelay(delay) = inner.metrics.dismiss_timing {
                        let weak = self.downgrade();
                        inner.teardown_task = Some(self.main.post_after(delay, move || {
                            if let Some(sheet) = Self::upgrade(&weak) {
                                sheet.teardown();
                            }
                        }));
                    }
                    debug!(?reason, hidden, timing = ?inner.metrics.dismiss_timing, "sheet dismissing");
                    None
                }
            }
        };
        if let Some(completion) = immediate {
            trace!(?reason, "dismiss on dismissed sheet, completing now");
            completion();
            return false;
        }
        self.ensure_frames();
        true
    }

    fn ensure_frames(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.frame_task.is_some() {
            return;
        }
        let weak = self.downgrade();
        let interval = inner.metrics.frame_interval;
        inner.frame_task = Some(self.main.post_after(interval, move || {
            if let Some(sheet) = Self::upgrade(&weak) {
                sheet.tick();
            }
        }));
    }

    fn tick(&self) {
        let now = self.main.now();
        let (settled, teardown_due) = {
            let mut inner = self.inner.borrow_mut();
            inner.frame_task = None;
            let offset_rest = inner.offset.settle(now);
            let dim_rest = inner.dim.settle(now);
            let settled = offset_rest && dim_rest;
            let teardown_due = settled
                && inner.phase == SheetPhase::Dismissing
                && inner.metrics.dismiss_timing == DismissTiming::AnimationSettled;
            (settled, teardown_due)
        };
        if !settled {
            self.ensure_frames();
            return;
        }
        trace!(offset = self.offset(), "sheet animation settled");
        if teardown_due {
            self.teardown();
        }
    }

    fn teardown(&self) {
        let completions = {
            let mut inner = self.inner.borrow_mut();
            if let Some(task) = inner.teardown_task.take() {
                self.main.cancel(task);
            }
            if inner.phase != SheetPhase::Dismissing {
                return;
            }
            inner.phase = SheetPhase::Dismissed;
            std::mem::take(&mut inner.completions)
        };
        debug!(completions = completions.len(), "sheet dismissed");
        for completion in completions {
            completion();
        }
        self.is_shown.set(false);
    }

    // -- input -------------------------------------------------------------

    /// Feed one gesture event.
    pub fn handle_event(&self, event: SheetEvent) -> Option<SheetAction> {
        match event {
            SheetEvent::DragChanged { translation } => {
                self.drag_changed(translation);
                None
            }
            SheetEvent::DragEnded { translation } => self.drag_ended(translation),
            SheetEvent::Tap { y } => {
                let region = {
                    let inner = self.inner.borrow();
                    inner.hit_test_y(y, self.main.now())
                };
                if region == SHEET_HIT_BACKDROP {
                    self.user_dismiss(DismissReason::Backdrop)
                } else {
                    None
                }
            }
            SheetEvent::Cancel => self.user_dismiss(DismissReason::Cancel),
        }
    }

    fn drag_changed(&self, translation: f32) {
        if !translation.is_finite() {
            return;
        }
        let now = self.main.now();
        let mut inner = self.inner.borrow_mut();
        if inner.phase != SheetPhase::Shown {
            return;
        }
        inner.translation = translation;
        let config = inner.config();
        let offset = inner.target_offset(&config);
        inner.offset.snap_to(offset, now);
        trace!(translation, offset, "drag sample");
    }

    fn drag_ended(&self, translation: f32) -> Option<SheetAction> {
        let translation = if translation.is_finite() { translation } else { 0.0 };
        let (allow, threshold) = {
            let mut inner = self.inner.borrow_mut();
            inner.translation = 0.0;
            if inner.phase != SheetPhase::Shown {
                return None;
            }
            let config = inner.config();
            (config.allow_dismiss, inner.dismiss_threshold(&config))
        };
        let crossed = translation > threshold;
        debug!(translation, threshold, crossed, allow, "drag ended");
        if crossed && allow {
            self.dismiss_with(DismissReason::Drag, None);
            return Some(SheetAction::Dismiss(DismissReason::Drag));
        }
        self.release_to_rest();
        Some(if crossed {
            SheetAction::DismissBlocked
        } else {
            SheetAction::SnapBack
        })
    }

    fn release_to_rest(&self) {
        let now = self.main.now();
        let animating = self.inner.borrow_mut().retarget(now);
        if animating {
            self.ensure_frames();
        }
    }

    fn user_dismiss(&self, reason: DismissReason) -> Option<SheetAction> {
        let (phase, allow) = {
            let inner = self.inner.borrow();
            (inner.phase, inner.config().allow_dismiss)
        };
        if phase != SheetPhase::Shown {
            return None;
        }
        if !allow {
            debug!(?reason, "user dismiss blocked");
            return Some(SheetAction::DismissBlocked);
        }
        self.dismiss_with(reason, None);
        Some(SheetAction::Dismiss(reason))
    }

    // -- layout ------------------------------------------------------------

    /// Lay the sheet out in `container`, reporting the stack height through
    /// Geometry Feedback and returning the frame's geometry.
    pub fn layout(&self, container: Size) -> SheetLayout {
        let container = Size::new(sanitize(container.width), sanitize(container.height));
        let _span = debug_span!(
            "sheet_layout",
            width = container.width,
            height = container.height
        )
        .entered();

        let (stack, probe, config) = {
            let mut inner = self.inner.borrow_mut();
            inner.container = Some(container);
            let config = inner.config();
            let stack = SheetStack {
                content: Rc::clone(&inner.content),
                indicator: config.indicator,
                bottom_padding: inner.metrics.bottom_padding,
                max_content_height: container.height * inner.metrics.content_max_height_ratio,
                last_content: Cell::new(Size::ZERO),
            };
            (stack, inner.probe.clone(), config)
        };

        let reader = GeometryReader::new(stack, probe);
        let stack_size = reader.layout(SizeProposal::width(container.width));
        let content_size = reader.content().last_content.get();

        let now = self.main.now();
        let (offset, progress) = {
            let mut inner = self.inner.borrow_mut();
            let animating = inner.retarget(now);
            let values = (inner.offset.value_at(now), inner.dim.value_at(now));
            drop(inner);
            if animating {
                self.ensure_frames();
            }
            values
        };

        let top = container.height - stack_size.height + offset;
        let indicator = config.indicator;
        let indicator_rect = indicator.visible.then(|| {
            Rect::new(
                (container.width - indicator.width) / 2.0,
                top + indicator.top_padding,
                indicator.width,
                indicator.height,
            )
        });
        let progress = progress.clamp(0.0, 1.0);
        SheetLayout {
            container: Rect::from_size(container),
            sheet: Rect::new(0.0, top, container.width, stack_size.height),
            indicator: indicator_rect,
            content: Rect::new(
                0.0,
                top + indicator.stack_height(),
                container.width,
                content_size.height,
            ),
            offset,
            dim: config.dim.color_at(progress),
            dim_opacity: progress * config.dim.opacity.clamp(0.0, 1.0),
            background: config.background,
            indicator_style: indicator,
        }
    }

    /// Replace the hosted content in place (no close/reopen).
    pub fn set_content(&self, content: Rc<dyn Measurable>) {
        self.inner.borrow_mut().content = content;
        trace!("sheet content replaced");
    }

    // -- queries -----------------------------------------------------------

    /// Offset the sheet is heading for.
    #[must_use]
    pub fn target_offset(&self) -> f32 {
        let inner = self.inner.borrow();
        let config = inner.config();
        inner.target_offset(&config)
    }

    /// Offset at the current loop time.
    #[must_use]
    pub fn offset(&self) -> f32 {
        self.inner.borrow().offset.value_at(self.main.now())
    }

    /// Dim layer opacity at the current loop time.
    #[must_use]
    pub fn dim_opacity(&self) -> f32 {
        let inner = self.inner.borrow();
        let progress = inner.dim.value_at(self.main.now()).clamp(0.0, 1.0);
        progress * inner.config().dim.opacity.clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn is_visually_shown(&self) -> bool {
        self.inner.borrow().visually_shown
    }

    /// Live drag translation (zero outside a gesture).
    #[must_use]
    pub fn translation(&self) -> f32 {
        self.inner.borrow().translation
    }

    /// Last measured stack height.
    #[must_use]
    pub fn content_height(&self) -> f32 {
        self.inner.borrow().content_height()
    }

    /// Downward translation a release must exceed to dismiss.
    #[must_use]
    pub fn dismiss_threshold(&self) -> f32 {
        let inner = self.inner.borrow();
        let config = inner.config();
        inner.dismiss_threshold(&config)
    }

    #[must_use]
    pub fn phase(&self) -> SheetPhase {
        self.inner.borrow().phase
    }

    /// Whether an animation frame is scheduled.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.inner.borrow().frame_task.is_some()
    }

    /// Effective configuration right now.
    #[must_use]
    pub fn resolved_configuration(&self) -> SheetConfiguration {
        self.inner.borrow().config()
    }

    /// The presentation flag this sheet is bound to.
    #[must_use]
    pub fn is_shown(&self) -> Observable<bool> {
        self.is_shown.clone()
    }

    /// The probe receiving stack heights.
    #[must_use]
    pub fn probe(&self) -> GeometryProbe {
        self.inner.borrow().probe.clone()
    }

    /// Whether two handles refer to the same sheet.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl DismissableView for BottomSheet {
    fn dismiss(&self, completion: Option<DismissCompletion>) {
        self.dismiss_with(DismissReason::Programmatic, completion);
    }
}

fn sanitize(length: f32) -> f32 {
    if length.is_finite() { length.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::animation::DismissTiming;
    use proptest::prelude::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    const SCREEN: Size = Size::new(390.0, 1000.0);

    struct Fixed(f32);

    impl Measurable for Fixed {
        fn measure(&self, proposal: SizeProposal) -> Size {
            Size::new(proposal.width.unwrap_or(0.0), self.0)
        }
    }

    /// Hidden indicator so the stack height is `content + 100`.
    fn plain() -> SheetConfiguration {
        SheetConfiguration::new().indicator(DragIndicator::hidden())
    }

    fn fixture(stack_height: f32, config: SheetConfiguration) -> (MainLoop, Observable<bool>, BottomSheet) {
        let main = MainLoop::new();
        let flag = Observable::new(true);
        let sheet = BottomSheet::new(flag.clone(), main.clone(), Fixed(stack_height - 100.0))
            .context(ConfigContext::new())
            .configuration(config);
        sheet.mount();
        sheet.layout(SCREEN);
        (main, flag, sheet)
    }

    fn shown(stack_height: f32, config: SheetConfiguration) -> (MainLoop, Observable<bool>, BottomSheet) {
        let (main, flag, sheet) = fixture(stack_height, config);
        main.run_turn();
        main.advance(Duration::from_secs(2));
        (main, flag, sheet)
    }

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> DismissCompletion) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let make = move || {
            let h = Rc::clone(&h);
            Box::new(move || h.set(h.get() + 1)) as DismissCompletion
        };
        (hits, make)
    }

    #[test]
    fn starts_hidden_then_shows_after_one_hop() {
        let (main, _flag, sheet) = fixture(400.0, plain());
        assert_eq!(sheet.phase(), SheetPhase::Hidden);
        assert_eq!(sheet.content_height(), 400.0);
        assert_eq!(sheet.offset(), 500.0);

        main.run_turn();
        assert_eq!(sheet.phase(), SheetPhase::Shown);
        assert!(sheet.is_visually_shown());
        assert_eq!(sheet.target_offset(), 100.0);

        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.offset(), 100.0);
        assert!(!sheet.is_animating());
    }

    #[test]
    fn unset_flag_does_not_show() {
        let main = MainLoop::new();
        let flag = Observable::new(false);
        let sheet = BottomSheet::new(flag, main.clone(), Fixed(100.0)).context(ConfigContext::new());
        sheet.mount();
        main.advance(Duration::from_secs(1));
        assert_eq!(sheet.phase(), SheetPhase::Hidden);
    }

    #[test]
    fn drag_follows_finger_and_clamps_over_drag() {
        let (_main, _flag, sheet) = shown(400.0, plain());
        sheet.handle_event(SheetEvent::DragChanged { translation: 50.0 });
        assert_eq!(sheet.offset(), 150.0);
        sheet.handle_event(SheetEvent::DragChanged { translation: -100.0 });
        assert_eq!(sheet.offset(), 62.0);
        assert_eq!(sheet.translation(), -100.0);
    }

    #[test]
    fn release_below_threshold_snaps_back() {
        let (main, _flag, sheet) = shown(500.0, plain());
        assert!((sheet.dismiss_threshold() - 152.0).abs() < 1e-3);

        sheet.handle_event(SheetEvent::DragChanged { translation: 152.0 });
        let action = sheet.handle_event(SheetEvent::DragEnded { translation: 152.0 });
        assert_eq!(action, Some(SheetAction::SnapBack));
        assert_eq!(sheet.translation(), 0.0);
        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.offset(), 100.0);
        assert_eq!(sheet.phase(), SheetPhase::Shown);
    }

    #[test]
    fn release_past_threshold_dismisses() {
        let (main, flag, sheet) = shown(400.0, plain().dismiss_ratio(0.5));
        assert_eq!(sheet.dismiss_threshold(), 150.0);

        let action = sheet.handle_event(SheetEvent::DragEnded { translation: 200.0 });
        assert_eq!(action, Some(SheetAction::Dismiss(DismissReason::Drag)));
        assert_eq!(sheet.phase(), SheetPhase::Dismissing);
        assert!(!sheet.is_visually_shown());
        assert_eq!(sheet.target_offset(), 500.0);
        assert!(flag.get());

        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
        assert_eq!(sheet.offset(), 500.0);
        assert!(!flag.get());
    }

    #[test]
    fn disallowed_dismiss_is_blocked_everywhere() {
        let (main, flag, sheet) = shown(400.0, plain().dismiss_ratio(0.5).allow_dismiss(false));

        assert_eq!(
            sheet.handle_event(SheetEvent::DragEnded { translation: 200.0 }),
            Some(SheetAction::DismissBlocked)
        );
        assert_eq!(
            sheet.handle_event(SheetEvent::Tap { y: 10.0 }),
            Some(SheetAction::DismissBlocked)
        );
        assert_eq!(
            sheet.handle_event(SheetEvent::Cancel),
            Some(SheetAction::DismissBlocked)
        );
        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.phase(), SheetPhase::Shown);
        assert_eq!(sheet.offset(), 100.0);
        assert!(flag.get());
    }

    #[test]
    fn backdrop_tap_dismisses_and_content_tap_is_swallowed() {
        let (_main, _flag, sheet) = shown(400.0, plain());
        let layout = sheet.layout(SCREEN);
        // Stack of 400 at offset 100 in a 1000-tall container starts at 700.
        assert_eq!(layout.sheet.y, 700.0);
        assert_eq!(layout.hit_test(Point::new(10.0, 750.0)), SHEET_HIT_CONTENT);
        assert_eq!(layout.hit_test(Point::new(10.0, 100.0)), SHEET_HIT_BACKDROP);

        assert_eq!(sheet.handle_event(SheetEvent::Tap { y: 750.0 }), None);
        assert_eq!(sheet.phase(), SheetPhase::Shown);
        assert_eq!(
            sheet.handle_event(SheetEvent::Tap { y: 100.0 }),
            Some(SheetAction::Dismiss(DismissReason::Backdrop))
        );
    }

    #[test]
    fn repeated_dismiss_runs_each_completion_once_before_flag_clears() {
        let (main, flag, sheet) = shown(400.0, plain());
        let (hits, make) = counter();
        let observed_flag = Rc::new(Cell::new(false));
        let (seen, f) = (Rc::clone(&observed_flag), flag.clone());

        assert!(sheet.dismiss_with(
            DismissReason::Programmatic,
            Some(Box::new(move || seen.set(f.get())))
        ));
        assert!(!sheet.dismiss_with(DismissReason::Programmatic, Some(make())));
        assert_eq!(sheet.handle_event(SheetEvent::Cancel), None);
        assert_eq!(sheet.phase(), SheetPhase::Dismissing);

        main.advance(Duration::from_secs(2));
        assert_eq!(hits.get(), 1);
        assert!(observed_flag.get(), "completion must run while the flag is still set");
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);

        main.advance(Duration::from_secs(2));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dismiss_after_teardown_completes_immediately() {
        let (main, _flag, sheet) = shown(400.0, plain());
        sheet.dismiss(None);
        main.advance(Duration::from_secs(2));
        let (hits, make) = counter();
        sheet.dismiss(Some(make()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn external_clear_animates_out() {
        let (main, flag, sheet) = shown(400.0, plain());
        flag.set(false);
        assert_eq!(sheet.phase(), SheetPhase::Dismissing);
        assert!(sheet.offset() < 500.0);
        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
        assert_eq!(sheet.offset(), 500.0);
    }

    #[test]
    fn external_clear_joins_in_flight_dismissal() {
        let (main, flag, sheet) = shown(400.0, plain());
        let (hits, make) = counter();
        sheet.dismiss(Some(make()));
        flag.set(false);
        main.advance(Duration::from_secs(2));
        assert_eq!(hits.get(), 1);
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
    }

    #[test]
    fn clear_before_show_hop_cancels_show() {
        let (main, flag, sheet) = fixture(400.0, plain());
        flag.set(false);
        main.advance(Duration::from_secs(1));
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
        assert_eq!(sheet.offset(), 500.0);
    }

    #[test]
    fn fixed_delay_tears_down_on_timer() {
        let (main, flag, sheet) = fixture(400.0, plain());
        let sheet = sheet.metrics(SheetMetrics::default().dismiss_timing(DismissTiming::legacy()));
        main.run_turn();
        main.advance(Duration::from_secs(2));

        sheet.dismiss(None);
        main.advance(Duration::from_millis(149));
        assert_eq!(sheet.phase(), SheetPhase::Dismissing);
        main.advance(Duration::from_millis(1));
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
        assert!(!flag.get());
    }

    #[test]
    fn settle_timing_outlasts_legacy_delay() {
        let (main, _flag, sheet) = shown(400.0, plain());
        sheet.dismiss(None);
        main.advance(Duration::from_millis(150));
        assert_eq!(sheet.phase(), SheetPhase::Dismissing);
        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
    }

    #[test]
    fn reopens_when_flag_set_again() {
        let (main, flag, sheet) = shown(400.0, plain());
        flag.set(false);
        main.advance(Duration::from_secs(2));
        flag.set(true);
        assert_eq!(sheet.phase(), SheetPhase::Dismissed);
        main.run_turn();
        assert_eq!(sheet.phase(), SheetPhase::Shown);
    }

    #[test]
    fn ambient_configuration_is_read_live() {
        let ctx = ConfigContext::new();
        let main = MainLoop::new();
        let flag = Observable::new(true);
        let sheet = BottomSheet::new(flag, main.clone(), Fixed(300.0))
            .context(ctx.clone())
            .configuration(plain().dismiss_ratio(0.5));
        sheet.mount();
        sheet.layout(SCREEN);
        assert_eq!(sheet.dismiss_threshold(), 150.0);

        let guard = ctx.push_override(plain().dismiss_ratio(0.25));
        assert_eq!(sheet.dismiss_threshold(), 75.0);
        drop(guard);
        assert_eq!(sheet.dismiss_threshold(), 150.0);
    }

    #[test]
    fn content_height_is_capped_by_screen_ratio() {
        let (_main, _flag, sheet) = fixture(2000.0, plain());
        // 0.55 * 1000 + 100 padding
        assert_eq!(sheet.content_height(), 650.0);
    }

    #[test]
    fn indicator_is_part_of_the_stack() {
        let (_main, _flag, sheet) = shown(400.0, SheetConfiguration::new());
        let layout = sheet.layout(SCREEN);
        assert_eq!(sheet.content_height(), 411.0);
        let indicator = layout.indicator.unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(indicator.width, 36.0);
        assert_eq!(indicator.y, layout.sheet.y + 6.0);
        assert_eq!(layout.content.y, layout.sheet.y + 11.0);
    }

    #[test]
    fn dim_fades_with_presence() {
        let (main, _flag, sheet) = shown(400.0, plain());
        assert!((sheet.dim_opacity() - 0.15).abs() < 1e-6);
        sheet.dismiss(None);
        main.advance(Duration::from_secs(2));
        assert_eq!(sheet.dim_opacity(), 0.0);
    }

    #[test]
    fn drag_ignored_while_dismissing() {
        let (_main, _flag, sheet) = shown(400.0, plain());
        sheet.dismiss(None);
        sheet.handle_event(SheetEvent::DragChanged { translation: 80.0 });
        assert_eq!(sheet.translation(), 0.0);
        assert_eq!(sheet.handle_event(SheetEvent::DragEnded { translation: 300.0 }), None);
    }

    #[test]
    fn unmeasured_sheet_dismisses_on_any_downward_release() {
        let main = MainLoop::new();
        let flag = Observable::new(true);
        let sheet = BottomSheet::new(flag, main.clone(), Fixed(0.0)).context(ConfigContext::new());
        sheet.mount();
        main.run_turn();
        assert_eq!(sheet.dismiss_threshold(), 0.0);
        assert_eq!(
            sheet.handle_event(SheetEvent::DragEnded { translation: 1.0 }),
            Some(SheetAction::Dismiss(DismissReason::Drag))
        );
    }

    #[test]
    fn dropping_sheet_cancels_pending_work() {
        let (main, flag, sheet) = fixture(400.0, plain());
        drop(sheet);
        main.advance(Duration::from_secs(1));
        assert!(main.is_idle());
        assert!(flag.get());
    }

    #[test]
    #[traced_test]
    fn dismissal_is_logged() {
        let (main, _flag, sheet) = shown(400.0, plain());
        sheet.handle_event(SheetEvent::Cancel);
        main.advance(Duration::from_secs(2));
        assert!(logs_contain("sheet dismissing"));
        assert!(logs_contain("sheet dismissed"));
    }

    proptest! {
        #[test]
        fn downward_drag_offset_is_linear(t in 0.0f32..2000.0) {
            let (_main, _flag, sheet) = shown(500.0, plain());
            sheet.handle_event(SheetEvent::DragChanged { translation: t });
            prop_assert!((sheet.target_offset() - (100.0 + t)).abs() < 1e-3);
        }

        #[test]
        fn upward_drag_offset_is_clamped(t in -2000.0f32..0.0, over in 0.0f32..200.0) {
            let (_main, _flag, sheet) = shown(500.0, plain().max_over_drag(over));
            sheet.handle_event(SheetEvent::DragChanged { translation: t });
            let expected = 100.0 + t.max(-over);
            prop_assert!((sheet.target_offset() - expected).abs() < 1e-3);
            prop_assert!(sheet.target_offset() >= 100.0 - over - 1e-3);
        }

        #[test]
        fn release_dismisses_iff_past_threshold(
            content in 0.0f32..500.0,
            ratio in 0.05f32..1.0,
            t in -200.0f32..800.0,
        ) {
            let (_main, _flag, sheet) = shown(content + 100.0, plain().dismiss_ratio(ratio));
            let threshold = (content * ratio).max(0.0);
            let action = sheet.handle_event(SheetEvent::DragEnded { translation: t });
            if t > threshold {
                prop_assert_eq!(action, Some(SheetAction::Dismiss(DismissReason::Drag)));
            } else {
                prop_assert_eq!(action, Some(SheetAction::SnapBack));
                prop_assert_eq!(sheet.phase(), SheetPhase::Shown);
            }
        }
    }
}
