#![forbid(unsafe_code)]

//! Presentation orchestration: one entry point, two strategies.
//!
//! [`SheetPresenter`] checks the platform once and returns a
//! [`SheetPresentation`]:
//!
//! - [`SheetPresentation::NativeDeclarative`] when the platform has detents;
//!   the host's sheet is configured through a [`NativeSheet`];
//! - [`SheetPresentation::CustomGestureDriven`] otherwise; a
//!   [`NonAnimatedModal`] hosts the gesture-driven [`BottomSheet`].
//!
//! Both satisfy the same contract: a presentation flag drives the sheet, the
//! content factory is re-run on refresh, and `on_dismiss` fires once per
//! transition of the flag from `true` to `false`, whatever caused it.
//!
//! Item-based presentation links an `Observable<Option<I>>` to the flag.
//! Replacing a shown item with another (same or different id) refreshes the
//! content in place; it never closes and reopens the sheet.
//!
//! [`BottomSheet`]: crate::sheet::engine::BottomSheet

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use fitsheet_runtime::{BindingScope, MainLoop, Observable, PresenceBinding, Subscription};
use tracing::{debug, trace};

use crate::geometry::{Size, SizeProposal};
use crate::measure::Measurable;
use crate::sheet::bridge::{ContentFactory, ModalHost, NonAnimatedModal};
use crate::sheet::config::{BehaviorOverride, ConfigContext, SheetConfiguration, SheetMetrics};
use crate::sheet::native::{NativeSheet, NativeSheetHost};

/// What the running platform can do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformCapabilities {
    /// Declarative sheets with detents and an interactive-dismiss flag.
    pub supports_detents: bool,
    /// Background, corner radius, and interaction styling for native sheets.
    pub supports_presentation_styling: bool,
    pub screen_size: Size,
}

impl PlatformCapabilities {
    /// Detents and styling.
    #[must_use]
    pub const fn modern(screen_size: Size) -> Self {
        Self {
            supports_detents: true,
            supports_presentation_styling: true,
            screen_size,
        }
    }

    /// Detents without styling.
    #[must_use]
    pub const fn detents_only(screen_size: Size) -> Self {
        Self {
            supports_detents: true,
            supports_presentation_styling: false,
            screen_size,
        }
    }

    /// Only the imperative modal primitive.
    #[must_use]
    pub const fn legacy(screen_size: Size) -> Self {
        Self {
            supports_detents: false,
            supports_presentation_styling: false,
            screen_size,
        }
    }

    /// Strategy used on this platform.
    #[must_use]
    pub fn strategy(&self) -> PresentationStrategy {
        if self.supports_detents {
            PresentationStrategy::NativeDeclarative
        } else {
            PresentationStrategy::CustomGestureDriven
        }
    }
}

/// Which path a presentation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationStrategy {
    NativeDeclarative,
    CustomGestureDriven,
}

/// Something with a stable identity.
pub trait Identifiable {
    type Id: PartialEq + Clone + Debug + 'static;

    fn id(&self) -> Self::Id;
}

/// Per-presentation options.
///
/// `allow_dismiss` and `scrollable` always win: they are applied after the
/// ambient, explicit and default configurations are resolved.
#[derive(Clone)]
pub struct PresentOptions {
    pub allow_dismiss: bool,
    pub scrollable: bool,
    /// Explicit configuration, replaced as a whole by an ambient one.
    pub configuration: Option<SheetConfiguration>,
    pub on_dismiss: Option<Rc<dyn Fn()>>,
}

impl Default for PresentOptions {
    fn default() -> Self {
        Self {
            allow_dismiss: true,
            scrollable: false,
            configuration: None,
            on_dismiss: None,
        }
    }
}

impl std::fmt::Debug for PresentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentOptions")
            .field("allow_dismiss", &self.allow_dismiss)
            .field("scrollable", &self.scrollable)
            .field("configuration", &self.configuration)
            .field("on_dismiss", &self.on_dismiss.is_some())
            .finish()
    }
}

impl PresentOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_dismiss(mut self, allow: bool) -> Self {
        self.allow_dismiss = allow;
        self
    }

    #[must_use]
    pub fn scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    /// Run `callback` each time the sheet goes from presented to dismissed.
    #[must_use]
    pub fn on_dismiss(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_dismiss = Some(Rc::new(callback));
        self
    }

    /// Ratio, over-drag and renderers for this presentation.
    #[must_use]
    pub fn configuration(mut self, config: SheetConfiguration) -> Self {
        self.configuration = Some(config);
        self
    }

    /// The per-call flags, pinned over every configuration tier.
    #[must_use]
    pub fn behavior(&self) -> BehaviorOverride {
        BehaviorOverride::pinned(self.allow_dismiss, self.scrollable)
    }
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// The part of a strategy that follows the presentation flag.
pub trait PresentationDriver {
    /// Start following the flag.
    fn attach(&self);
    /// Rebuild the content of a presented sheet in place.
    fn refresh(&self);
    /// Whether the platform layer is currently showing the sheet.
    fn is_presenting(&self) -> bool;
}

impl PresentationDriver for NonAnimatedModal {
    fn attach(&self) {
        NonAnimatedModal::attach(self);
    }

    fn refresh(&self) {
        self.update();
    }

    fn is_presenting(&self) -> bool {
        NonAnimatedModal::is_presenting(self)
    }
}

impl PresentationDriver for NativeSheet {
    fn attach(&self) {
        NativeSheet::attach(self);
    }

    fn refresh(&self) {
        self.update();
    }

    fn is_presenting(&self) -> bool {
        NativeSheet::is_presenting(self)
    }
}

/// A live presentation through one strategy.
pub struct Presented<D> {
    driver: D,
    is_presented: Observable<bool>,
    scope: BindingScope,
}

impl<D: PresentationDriver> Presented<D> {
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: Debug> Debug for Presented<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presented")
            .field("driver", &self.driver)
            .field("is_presented", &self.is_presented.get())
            .finish()
    }
}

/// Result of [`SheetPresenter::present`] / [`SheetPresenter::present_item`].
///
/// Dropping it detaches the presentation: flag changes are no longer
/// followed and `on_dismiss` stops firing.
#[derive(Debug)]
pub enum SheetPresentation {
    NativeDeclarative(Presented<NativeSheet>),
    CustomGestureDriven(Presented<NonAnimatedModal>),
}

impl SheetPresentation {
    #[must_use]
    pub fn strategy(&self) -> PresentationStrategy {
        match self {
            Self::NativeDeclarative(_) => PresentationStrategy::NativeDeclarative,
            Self::CustomGestureDriven(_) => PresentationStrategy::CustomGestureDriven,
        }
    }

    fn flag(&self) -> &Observable<bool> {
        match self {
            Self::NativeDeclarative(p) => &p.is_presented,
            Self::CustomGestureDriven(p) => &p.is_presented,
        }
    }

    /// The presentation flag (requested state).
    #[must_use]
    pub fn is_presented(&self) -> bool {
        self.flag().get()
    }

    /// Whether the platform layer is showing the sheet right now.
    #[must_use]
    pub fn is_presenting(&self) -> bool {
        match self {
            Self::NativeDeclarative(p) => p.driver.is_presenting(),
            Self::CustomGestureDriven(p) => p.driver.is_presenting(),
        }
    }

    /// Request dismissal (animated on the gesture-driven path).
    pub fn dismiss(&self) {
        debug!(strategy = ?self.strategy(), "presentation dismiss requested");
        self.flag().set(false);
    }

    /// Re-run the content factory for a presented sheet.
    pub fn refresh(&self) {
        match self {
            Self::NativeDeclarative(p) => p.driver.refresh(),
            Self::CustomGestureDriven(p) => p.driver.refresh(),
        }
    }

    #[must_use]
    pub fn native(&self) -> Option<&NativeSheet> {
        match self {
            Self::NativeDeclarative(p) => Some(&p.driver),
            Self::CustomGestureDriven(_) => None,
        }
    }

    #[must_use]
    pub fn custom(&self) -> Option<&NonAnimatedModal> {
        match self {
            Self::CustomGestureDriven(p) => Some(&p.driver),
            Self::NativeDeclarative(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SheetPresenter
// ---------------------------------------------------------------------------

/// Zero-size content shown when an item presentation has no item.
struct EmptyContent;

impl Measurable for EmptyContent {
    fn measure(&self, proposal: SizeProposal) -> Size {
        Size::new(proposal.width.unwrap_or(0.0), 0.0)
    }
}

/// Routes presentations to the strategy the platform supports.
#[derive(Clone)]
pub struct SheetPresenter {
    main: MainLoop,
    capabilities: PlatformCapabilities,
    native_host: Rc<dyn NativeSheetHost>,
    modal_host: Rc<dyn ModalHost>,
    context: ConfigContext,
    metrics: SheetMetrics,
}

impl Debug for SheetPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetPresenter")
            .field("capabilities", &self.capabilities)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl SheetPresenter {
    pub fn new(
        main: MainLoop,
        capabilities: PlatformCapabilities,
        native_host: Rc<dyn NativeSheetHost>,
        modal_host: Rc<dyn ModalHost>,
    ) -> Self {
        Self {
            main,
            capabilities,
            native_host,
            modal_host,
            context: ConfigContext::global(),
            metrics: SheetMetrics::default(),
        }
    }

    /// Resolve ambient configuration through `context`.
    #[must_use]
    pub fn context(mut self, context: ConfigContext) -> Self {
        self.context = context;
        self
    }

    /// Engine constants for the gesture-driven path.
    #[must_use]
    pub fn metrics(mut self, metrics: SheetMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Present while `is_presented` is `true`.
    pub fn present(
        &self,
        is_presented: &Observable<bool>,
        options: PresentOptions,
        content: impl Fn() -> Rc<dyn Measurable> + 'static,
    ) -> SheetPresentation {
        self.build(is_presented.clone(), &options, Rc::new(content), BindingScope::new())
    }

    /// Present while `item` holds a value, building content from it.
    pub fn present_item<I>(
        &self,
        item: &Observable<Option<I>>,
        options: PresentOptions,
        content: impl Fn(&I) -> Rc<dyn Measurable> + 'static,
    ) -> SheetPresentation
    where
        I: Identifiable + Clone + PartialEq + 'static,
    {
        let flag = Observable::new(false);
        let mut scope = BindingScope::new();
        scope.hold_presence(PresenceBinding::new(item, &flag));

        let source = item.clone();
        let factory: ContentFactory = Rc::new(move || {
            source.with(|current| match current {
                Some(value) => content(value),
                None => Rc::new(EmptyContent) as Rc<dyn Measurable>,
            })
        });

        let mut presentation = self.build(flag, &options, factory, scope);
        let shown_id: Rc<RefCell<Option<I::Id>>> =
            Rc::new(RefCell::new(item.with(|i| i.as_ref().map(Identifiable::id))));

        let refresher = presentation.refresh_handle();
        let tracker = item.subscribe(move |current| {
            let next = current.as_ref().map(Identifiable::id);
            let previous = shown_id.replace(next.clone());
            match (previous, next) {
                (Some(previous), Some(next)) if previous == next => {
                    trace!(id = ?next, "item payload changed, refreshing in place");
                    refresher();
                }
                (Some(previous), Some(next)) => {
                    debug!(from = ?previous, to = ?next, "item identity changed, updating content in place");
                    refresher();
                }
                (None, Some(next)) => trace!(id = ?next, "item presented"),
                (_, None) => trace!("item cleared"),
            }
        });
        presentation.hold(tracker);
        presentation
    }

    fn build(
        &self,
        flag: Observable<bool>,
        options: &PresentOptions,
        content: ContentFactory,
        mut scope: BindingScope,
    ) -> SheetPresentation {
        if let Some(on_dismiss) = options.on_dismiss.clone() {
            scope.hold(dismiss_notifier(&flag, on_dismiss));
        }
        let behavior = options.behavior();
        let strategy = self.capabilities.strategy();
        debug!(?strategy, allow_dismiss = options.allow_dismiss, scrollable = options.scrollable, "routing sheet presentation");

        match strategy {
            PresentationStrategy::NativeDeclarative => {
                let driver = NativeSheet::new(flag.clone(), Rc::clone(&self.native_host), content)
                    .behavior(behavior)
                    .context(self.context.clone())
                    .styled(self.capabilities.supports_presentation_styling);
                let driver = match options.configuration.clone() {
                    Some(config) => driver.configuration(config),
                    None => driver,
                };
                driver.attach();
                SheetPresentation::NativeDeclarative(Presented {
                    driver,
                    is_presented: flag,
                    scope,
                })
            }
            PresentationStrategy::CustomGestureDriven => {
                let driver = NonAnimatedModal::new(
                    flag.clone(),
                    self.main.clone(),
                    Rc::clone(&self.modal_host),
                    content,
                )
                .behavior(behavior)
                .context(self.context.clone())
                .metrics(self.metrics);
                let driver = match options.configuration.clone() {
                    Some(config) => driver.configuration(config),
                    None => driver,
                };
                driver.attach();
                SheetPresentation::CustomGestureDriven(Presented {
                    driver,
                    is_presented: flag,
                    scope,
                })
            }
        }
    }
}

impl SheetPresentation {
    fn scope_mut(&mut self) -> &mut BindingScope {
        match self {
            Self::NativeDeclarative(p) => &mut p.scope,
            Self::CustomGestureDriven(p) => &mut p.scope,
        }
    }

    fn hold(&mut self, subscription: Subscription) {
        self.scope_mut().hold(subscription);
    }

    fn refresh_handle(&self) -> impl Fn() + 'static {
        let native = self.native().cloned();
        let custom = self.custom().cloned();
        move || {
            if let Some(driver) = &native {
                driver.refresh();
            }
            if let Some(driver) = &custom {
                driver.refresh();
            }
        }
    }
}

/// Fire `on_dismiss` on every `true -> false` transition of `flag`.
fn dismiss_notifier(flag: &Observable<bool>, on_dismiss: Rc<dyn Fn()>) -> Subscription {
    let was_presented = Rc::new(Cell::new(flag.get()));
    flag.subscribe(move |presented| {
        let before = was_presented.replace(*presented);
        if before && !*presented {
            debug!("presentation dismissed, notifying");
            on_dismiss();
        }
    })
}
