#![forbid(unsafe_code)]

//! Sheet configuration, render descriptors, and the ambient override chain.
//!
//! A [`SheetConfiguration`] is an immutable value built once per
//! presentation. At every layout pass and gesture end the engine resolves the
//! effective configuration through three tiers:
//!
//! 1. the ambient value from a [`ConfigContext`] (scoped override first,
//!    then the context's base value),
//! 2. the explicit configuration the sheet was constructed with,
//! 3. [`SheetConfiguration::default`].
//!
//! A [`BehaviorOverride`] carrying the per-presentation `allow_dismiss` and
//! `scrollable` flags is applied on top of the result, so those flags hold
//! even when an ambient configuration replaces the explicit one.
//!
//! Resolution is never cached, so a context change is observed on the next
//! pass. Hosts that push requests (the native path) subscribe instead.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fitsheet_runtime::{Observable, Subscription};

use crate::color::Rgba;
use crate::sheet::animation::{DismissTiming, SpringCurve};

thread_local! {
    static GLOBAL_CONTEXT: ConfigContext = ConfigContext::new();
}

/// Default fraction of the visible sheet height a drag must exceed to dismiss.
pub const DEFAULT_DISMISS_RATIO: f32 = 0.38;
/// Default distance the sheet may be pulled above its resting position.
pub const DEFAULT_MAX_OVER_DRAG: f32 = 38.0;
/// Extra height kept below the content for over-drag and corner hiding.
pub const DEFAULT_BOTTOM_PADDING: f32 = 100.0;
/// Content never grows taller than this fraction of the screen.
pub const DEFAULT_CONTENT_MAX_HEIGHT_RATIO: f32 = 0.55;
/// Corner radius of the sheet surface.
pub const DEFAULT_CORNER_RADIUS: f32 = 16.0;
/// Opacity of the dim layer behind the sheet.
pub const DEFAULT_DIM_OPACITY: f32 = 0.15;
/// Frame cadence for animation ticks.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ---------------------------------------------------------------------------
// Render descriptors
// ---------------------------------------------------------------------------

/// Background painted behind the sheet content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetBackground {
    pub color: Rgba,
    pub corner_radius: f32,
}

impl Default for SheetBackground {
    fn default() -> Self {
        Self {
            color: Rgba::SYSTEM_BACKGROUND,
            corner_radius: DEFAULT_CORNER_RADIUS,
        }
    }
}

impl SheetBackground {
    pub fn new(color: Rgba, corner_radius: f32) -> Self {
        Self {
            color,
            corner_radius: corner_radius.max(0.0),
        }
    }
}

/// Dim layer drawn over the presenting content (the backdrop).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimStyle {
    /// Dim color (alpha will be scaled by `opacity`).
    pub color: Rgba,
    /// Opacity in `[0.0, 1.0]` when the sheet is fully shown.
    pub opacity: f32,
}

impl Default for DimStyle {
    fn default() -> Self {
        Self {
            color: Rgba::BLACK,
            opacity: DEFAULT_DIM_OPACITY,
        }
    }
}

impl DimStyle {
    pub fn new(color: Rgba, opacity: f32) -> Self {
        Self { color, opacity }
    }

    /// Set dim color.
    pub fn color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    /// Set dim opacity.
    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Color to paint at a given show progress (`0.0` hidden, `1.0` shown).
    #[must_use]
    pub fn color_at(&self, progress: f32) -> Rgba {
        self.color
            .with_opacity(self.opacity.clamp(0.0, 1.0) * progress.clamp(0.0, 1.0))
    }
}

/// Drag handle drawn at the top of the sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragIndicator {
    pub width: f32,
    pub height: f32,
    pub corner_radius: f32,
    pub top_padding: f32,
    pub color: Rgba,
    pub visible: bool,
}

impl Default for DragIndicator {
    fn default() -> Self {
        Self {
            width: 36.0,
            height: 5.0,
            corner_radius: 4.0,
            top_padding: 6.0,
            color: Rgba::SEPARATOR,
            visible: true,
        }
    }
}

impl DragIndicator {
    /// A hidden indicator (takes no space).
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::default()
        }
    }

    /// Vertical space the indicator occupies in the sheet stack.
    #[must_use]
    pub fn stack_height(&self) -> f32 {
        if self.visible {
            self.top_padding + self.height
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// SheetConfiguration
// ---------------------------------------------------------------------------

/// Appearance and interaction behavior of a bottom sheet.
///
/// Invariant expected by the engine: `dismiss_ratio > 0`. A ratio at or
/// below zero makes any downward drag dismiss (threshold `<= 0`), a ratio
/// above one makes drag-dismiss unreachable. Both are accepted as degraded
/// but defined behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetConfiguration {
    pub dismiss_ratio: f32,
    pub max_over_drag: f32,
    pub background: SheetBackground,
    pub dim: DimStyle,
    pub indicator: DragIndicator,
    pub allow_dismiss: bool,
    pub scrollable: bool,
}

impl Default for SheetConfiguration {
    fn default() -> Self {
        Self {
            dismiss_ratio: DEFAULT_DISMISS_RATIO,
            max_over_drag: DEFAULT_MAX_OVER_DRAG,
            background: SheetBackground::default(),
            dim: DimStyle::default(),
            indicator: DragIndicator::default(),
            allow_dismiss: true,
            scrollable: true,
        }
    }
}

impl SheetConfiguration {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dismiss ratio. Non-finite values fall back to the default.
    pub fn dismiss_ratio(mut self, ratio: f32) -> Self {
        self.dismiss_ratio = if ratio.is_finite() {
            ratio
        } else {
            DEFAULT_DISMISS_RATIO
        };
        self
    }

    /// Set the max over-drag distance (clamped to `>= 0`).
    pub fn max_over_drag(mut self, distance: f32) -> Self {
        self.max_over_drag = if distance.is_finite() {
            distance.max(0.0)
        } else {
            DEFAULT_MAX_OVER_DRAG
        };
        self
    }

    pub fn background(mut self, background: SheetBackground) -> Self {
        self.background = background;
        self
    }

    pub fn dim(mut self, dim: DimStyle) -> Self {
        self.dim = dim;
        self
    }

    pub fn indicator(mut self, indicator: DragIndicator) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn allow_dismiss(mut self, allow: bool) -> Self {
        self.allow_dismiss = allow;
        self
    }

    pub fn scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    /// Resolve the effective configuration: ambient, then explicit, then default.
    #[must_use]
    pub fn resolve(ambient: Option<&Self>, explicit: Option<&Self>) -> Self {
        ambient.or(explicit).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// SheetMetrics
// ---------------------------------------------------------------------------

/// Engine constants outside the configuration surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetMetrics {
    /// Height appended below the content (kept off-screen at rest).
    pub bottom_padding: f32,
    /// Content max height as a fraction of the screen height.
    pub content_max_height_ratio: f32,
    /// Curve for show, hide, and drag-follow animations.
    pub spring: SpringCurve,
    /// What drives teardown after the exit animation starts.
    pub dismiss_timing: DismissTiming,
    /// Animation tick cadence.
    pub frame_interval: Duration,
}

impl Default for SheetMetrics {
    fn default() -> Self {
        Self {
            bottom_padding: DEFAULT_BOTTOM_PADDING,
            content_max_height_ratio: DEFAULT_CONTENT_MAX_HEIGHT_RATIO,
            spring: SpringCurve::INTERACTIVE,
            dismiss_timing: DismissTiming::default(),
            frame_interval: FRAME_INTERVAL,
        }
    }
}

impl SheetMetrics {
    pub fn bottom_padding(mut self, padding: f32) -> Self {
        self.bottom_padding = padding.max(0.0);
        self
    }

    pub fn content_max_height_ratio(mut self, ratio: f32) -> Self {
        self.content_max_height_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn spring(mut self, spring: SpringCurve) -> Self {
        self.spring = spring;
        self
    }

    pub fn dismiss_timing(mut self, timing: DismissTiming) -> Self {
        self.dismiss_timing = timing;
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval.max(Duration::from_millis(1));
        self
    }
}

// ---------------------------------------------------------------------------
// BehaviorOverride
// ---------------------------------------------------------------------------

/// Per-presentation behavior applied on top of the resolved configuration.
///
/// Set fields win over every tier, ambient included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorOverride {
    pub allow_dismiss: Option<bool>,
    pub scrollable: Option<bool>,
}

impl BehaviorOverride {
    /// Leave the resolved configuration untouched.
    pub const NONE: Self = Self {
        allow_dismiss: None,
        scrollable: None,
    };

    /// Pin both flags.
    #[must_use]
    pub const fn pinned(allow_dismiss: bool, scrollable: bool) -> Self {
        Self {
            allow_dismiss: Some(allow_dismiss),
            scrollable: Some(scrollable),
        }
    }

    #[must_use]
    pub fn apply(self, mut config: SheetConfiguration) -> SheetConfiguration {
        if let Some(allow) = self.allow_dismiss {
            config.allow_dismiss = allow;
        }
        if let Some(scrollable) = self.scrollable {
            config.scrollable = scrollable;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// ConfigContext
// ---------------------------------------------------------------------------

struct OverrideStack {
    next_id: u64,
    entries: Vec<(u64, SheetConfiguration)>,
}

/// Ambient sheet configuration with scoped overrides.
///
/// Cloning yields another handle to the same context. Setting the base
/// value, pushing an override and dropping one all bump
/// [`ConfigContext::version`] and notify subscribers.
#[derive(Clone)]
pub struct ConfigContext {
    ambient: Observable<Option<SheetConfiguration>>,
    overrides: Rc<RefCell<OverrideStack>>,
    revision: Observable<u64>,
}

impl std::fmt::Debug for ConfigContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigContext")
            .field("current", &self.current())
            .field("overrides", &self.overrides.borrow().entries.len())
            .field("revision", &self.revision.get())
            .finish()
    }
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigContext {
    /// A context with no ambient configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ambient: Observable::new(None),
            overrides: Rc::new(RefCell::new(OverrideStack {
                next_id: 0,
                entries: Vec::new(),
            })),
            revision: Observable::new(0),
        }
    }

    /// Access the global context (thread-local).
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONTEXT.with(Clone::clone)
    }

    /// Active ambient configuration, honoring any scoped override.
    #[must_use]
    pub fn current(&self) -> Option<SheetConfiguration> {
        if let Some((_, config)) = self.overrides.borrow().entries.last() {
            Some(config.clone())
        } else {
            self.ambient.get()
        }
    }

    /// Set (or clear) the base ambient configuration.
    pub fn set(&self, config: Option<SheetConfiguration>) {
        let before = self.ambient.version();
        self.ambient.set(config);
        if self.ambient.version() != before {
            self.bump();
        }
    }

    /// Subscribe to changes of the active ambient configuration.
    ///
    /// The callback receives [`ConfigContext::current`] after the change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&Option<SheetConfiguration>) + 'static) -> Subscription {
        let context = self.clone();
        self.revision.subscribe(move |_| callback(&context.current()))
    }

    /// Push a scoped override. Dropping the guard removes exactly this
    /// override, whatever order guards are dropped in.
    #[must_use = "dropping this guard clears the configuration override"]
    pub fn push_override(&self, config: SheetConfiguration) -> ConfigOverride {
        let id = {
            let mut stack = self.overrides.borrow_mut();
            let id = stack.next_id;
            stack.next_id += 1;
            stack.entries.push((id, config));
            id
        };
        self.bump();
        ConfigOverride {
            context: self.clone(),
            id,
        }
    }

    /// Resolve against this context.
    #[must_use]
    pub fn resolve(&self, explicit: Option<&SheetConfiguration>) -> SheetConfiguration {
        let ambient = self.current();
        SheetConfiguration::resolve(ambient.as_ref(), explicit)
    }

    /// Resolve, then apply per-presentation behavior on top.
    #[must_use]
    pub fn resolve_with(
        &self,
        explicit: Option<&SheetConfiguration>,
        behavior: BehaviorOverride,
    ) -> SheetConfiguration {
        behavior.apply(self.resolve(explicit))
    }

    /// Change counter of the active ambient value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.revision.get()
    }

    fn bump(&self) {
        self.revision.update(|r| *r = r.wrapping_add(1));
    }

    fn remove_override(&self, id: u64) {
        let removed = {
            let mut stack = self.overrides.borrow_mut();
            let position = stack.entries.iter().position(|(entry, _)| *entry == id);
            position.map(|idx| stack.entries.remove(idx)).is_some()
        };
        if removed {
            self.bump();
        }
    }
}

/// RAII guard for a scoped configuration override.
#[must_use = "dropping this guard clears the configuration override"]
pub struct ConfigOverride {
    context: ConfigContext,
    id: u64,
}

impl Drop for ConfigOverride {
    fn drop(&mut self) {
        self.context.remove_override(self.id);
    }
}

impl std::fmt::Debug for ConfigOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOverride").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SheetConfiguration::default();
        assert_eq!(config.dismiss_ratio, 0.38);
        assert_eq!(config.max_over_drag, 38.0);
        assert!(config.allow_dismiss);
        assert!(config.scrollable);
        assert_eq!(config.dim.opacity, 0.15);
        assert_eq!(config.background.corner_radius, 16.0);
        assert_eq!(config.indicator.stack_height(), 11.0);
    }

    #[test]
    fn builder_sanitizes() {
        let config = SheetConfiguration::new()
            .dismiss_ratio(f32::INFINITY)
            .max_over_drag(-5.0);
        assert_eq!(config.dismiss_ratio, DEFAULT_DISMISS_RATIO);
        assert_eq!(config.max_over_drag, 0.0);
        // Degraded ratios are kept as given.
        assert_eq!(SheetConfiguration::new().dismiss_ratio(1.5).dismiss_ratio, 1.5);
    }

    #[test]
    fn resolve_precedence() {
        let ambient = SheetConfiguration::new().dismiss_ratio(0.9);
        let explicit = SheetConfiguration::new().dismiss_ratio(0.5);

        assert_eq!(
            SheetConfiguration::resolve(Some(&ambient), Some(&explicit)).dismiss_ratio,
            0.9
        );
        assert_eq!(
            SheetConfiguration::resolve(None, Some(&explicit)).dismiss_ratio,
            0.5
        );
        assert_eq!(
            SheetConfiguration::resolve(None, None),
            SheetConfiguration::default()
        );
    }

    #[test]
    fn context_override_is_scoped_and_lifo() {
        let ctx = ConfigContext::new();
        assert_eq!(ctx.current(), None);
        ctx.set(Some(SheetConfiguration::new().allow_dismiss(false)));

        let outer = ctx.push_override(SheetConfiguration::new().dismiss_ratio(0.2));
        {
            let _inner = ctx.push_override(SheetConfiguration::new().dismiss_ratio(0.7));
            assert_eq!(ctx.resolve(None).dismiss_ratio, 0.7);
        }
        assert_eq!(ctx.resolve(None).dismiss_ratio, 0.2);
        drop(outer);
        assert!(!ctx.resolve(None).allow_dismiss);
    }

    #[test]
    fn context_changes_bump_version() {
        let ctx = ConfigContext::new();
        let v0 = ctx.version();
        ctx.set(None);
        assert_eq!(ctx.version(), v0);
        ctx.set(Some(SheetConfiguration::default()));
        let v1 = ctx.version();
        assert!(v1 > v0);
        drop(ctx.push_override(SheetConfiguration::new()));
        assert_eq!(ctx.version(), v1 + 2);
    }

    #[test]
    fn overrides_dropped_out_of_order_remove_their_own_entry() {
        let ctx = ConfigContext::new();
        let outer = ctx.push_override(SheetConfiguration::new().dismiss_ratio(0.2));
        let inner = ctx.push_override(SheetConfiguration::new().dismiss_ratio(0.7));

        drop(outer);
        assert_eq!(ctx.resolve(None).dismiss_ratio, 0.7);
        drop(inner);
        assert_eq!(ctx.current(), None);
    }

    #[test]
    fn overrides_notify_subscribers() {
        let ctx = ConfigContext::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = ctx.subscribe(move |config| {
            s.borrow_mut().push(config.as_ref().map(|c| c.allow_dismiss));
        });

        ctx.set(Some(SheetConfiguration::new().max_over_drag(10.0)));
        let guard = ctx.push_override(SheetConfiguration::new().allow_dismiss(false));
        drop(guard);
        ctx.set(None);

        assert_eq!(*seen.borrow(), vec![Some(true), Some(false), Some(true), None]);
    }

    #[test]
    fn behavior_override_wins_over_ambient() {
        let ctx = ConfigContext::new();
        ctx.set(Some(SheetConfiguration::new().max_over_drag(10.0)));
        let explicit = SheetConfiguration::new().dismiss_ratio(0.5);

        let config = ctx.resolve_with(Some(&explicit), BehaviorOverride::pinned(false, false));
        assert!(!config.allow_dismiss);
        assert!(!config.scrollable);
        assert_eq!(config.max_over_drag, 10.0);
        assert_eq!(config.dismiss_ratio, DEFAULT_DISMISS_RATIO);

        let untouched = ctx.resolve_with(None, BehaviorOverride::NONE);
        assert!(untouched.allow_dismiss);
        assert!(untouched.scrollable);
    }

    #[test]
    fn dim_color_follows_progress() {
        let dim = DimStyle::default();
        assert_eq!(dim.color_at(0.0).a, 0);
        assert_eq!(dim.color_at(1.0).a, (255.0_f32 * 0.15).round() as u8);
    }

    #[test]
    fn hidden_indicator_takes_no_space() {
        assert_eq!(DragIndicator::hidden().stack_height(), 0.0);
    }
}
