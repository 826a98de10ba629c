#![forbid(unsafe_code)]

//! Test harness for fitsheet.
//!
//! Recording fake hosts stand in for the platform: [`FakeModalHost`] for the
//! imperative modal primitive and [`FakeNativeHost`] for the declarative
//! sheet. Both write into a shared [`EventLog`] so tests can assert the
//! order in which completions, flag changes, and host calls happened.
//! [`Harness`] bundles them with a virtual-time [`MainLoop`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use fitsheet_runtime::{MainLoop, Observable, Subscription};
use fitsheet_widgets::geometry::{Size, SizeProposal};
use fitsheet_widgets::measure::Measurable;
use fitsheet_widgets::sheet::{
    BottomSheet, ConfigContext, ModalHost, ModalSurface, NativeSheetHost, NativeSheetRequest,
    PlatformCapabilities, SheetEvent, SheetLayout, SheetMetrics, SheetPresenter,
    UserDismissHandler,
};

pub mod logs;
pub mod strategies;

/// Screen used by default: a 390x844 phone.
pub const PHONE: Size = Size::new(390.0, 844.0);

/// Long enough for any sheet animation to settle.
pub const SETTLE: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Something a fake host or test hook observed.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ModalPresented { animated: bool },
    ModalDismissed { animated: bool },
    NativePresented(NativeSheetRequest),
    NativeUpdated(NativeSheetRequest),
    NativeDismissed,
    /// A dismiss completion ran.
    Completion(&'static str),
    /// An `on_dismiss` callback ran.
    OnDismiss,
    /// A watched presentation flag changed.
    Flag(bool),
}

/// Shared, append-only record of [`HostEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<HostEvent>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&HostEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(e)).count()
    }

    /// Index of the first event equal to `event`.
    #[must_use]
    pub fn position(&self, event: &HostEvent) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Record every change of `flag` as [`HostEvent::Flag`].
    #[must_use = "dropping the subscription stops recording"]
    pub fn watch(&self, flag: &Observable<bool>) -> Subscription {
        let log = self.clone();
        flag.subscribe(move |value| log.push(HostEvent::Flag(*value)))
    }

    /// A completion that records [`HostEvent::Completion`].
    #[must_use]
    pub fn completion(&self, tag: &'static str) -> Box<dyn FnOnce()> {
        let log = self.clone();
        Box::new(move || log.push(HostEvent::Completion(tag)))
    }

    /// An `on_dismiss` callback that records [`HostEvent::OnDismiss`].
    #[must_use]
    pub fn on_dismiss(&self) -> impl Fn() + 'static {
        let log = self.clone();
        move || log.push(HostEvent::OnDismiss)
    }
}

/// Assert that `log` contains `expected` in this relative order.
#[macro_export]
macro_rules! assert_ordered {
    ($log:expr, [$($event:expr),+ $(,)?]) => {{
        let events = $log.events();
        let expected = vec![$($event),+];
        let mut cursor = 0usize;
        for event in &events {
            if cursor < expected.len() && *event == expected[cursor] {
                cursor += 1;
            }
        }
        assert_eq!(
            cursor,
            expected.len(),
            "expected {:?} in order, log was {:?}",
            expected,
            events
        );
    }};
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Content with a fixed natural height that tests can change.
#[derive(Debug)]
pub struct FixedContent {
    height: Cell<f32>,
    measures: Cell<u32>,
}

impl FixedContent {
    #[must_use]
    pub fn new(height: f32) -> Rc<Self> {
        Rc::new(Self {
            height: Cell::new(height),
            measures: Cell::new(0),
        })
    }

    pub fn set_height(&self, height: f32) {
        self.height.set(height);
    }

    /// How many times the content was measured.
    #[must_use]
    pub fn measures(&self) -> u32 {
        self.measures.get()
    }
}

impl Measurable for FixedContent {
    fn measure(&self, proposal: SizeProposal) -> Size {
        self.measures.set(self.measures.get() + 1);
        Size::new(proposal.width.unwrap_or(0.0), self.height.get())
    }
}

/// Factory returning `content` every time.
pub fn shared(content: &Rc<FixedContent>) -> impl Fn() -> Rc<dyn Measurable> + 'static {
    let content = Rc::clone(content);
    move || Rc::clone(&content) as Rc<dyn Measurable>
}

// ---------------------------------------------------------------------------
// Fake hosts
// ---------------------------------------------------------------------------

/// Imperative modal primitive.
#[derive(Debug, Default)]
pub struct FakeModalHost {
    log: EventLog,
    surface: RefCell<Option<ModalSurface>>,
}

impl FakeModalHost {
    #[must_use]
    pub fn new(log: EventLog) -> Rc<Self> {
        Rc::new(Self {
            log,
            surface: RefCell::new(None),
        })
    }

    /// Sheet hosted by the current surface.
    #[must_use]
    pub fn sheet(&self) -> Option<BottomSheet> {
        self.surface.borrow().as_ref().map(|s| s.sheet.clone())
    }

    #[must_use]
    pub fn surface(&self) -> Option<ModalSurface> {
        self.surface.borrow().clone()
    }

    /// Lay out the hosted sheet on `screen`.
    #[must_use]
    pub fn render(&self, screen: Size) -> Option<SheetLayout> {
        self.sheet().map(|sheet| sheet.layout(screen))
    }

    /// Deliver a full drag (one sample, then release) to the hosted sheet.
    pub fn drag(&self, translation: f32) {
        if let Some(sheet) = self.sheet() {
            sheet.handle_event(SheetEvent::DragChanged { translation });
            sheet.handle_event(SheetEvent::DragEnded { translation });
        }
    }
}

impl ModalHost for FakeModalHost {
    fn present(&self, surface: ModalSurface, animated: bool) {
        tracing::debug!(animated, "fake modal host presenting");
        *self.surface.borrow_mut() = Some(surface);
        self.log.push(HostEvent::ModalPresented { animated });
    }

    fn dismiss(&self, animated: bool) {
        tracing::debug!(animated, "fake modal host dismissing");
        self.surface.borrow_mut().take();
        self.log.push(HostEvent::ModalDismissed { animated });
    }

    fn is_presenting(&self) -> bool {
        self.surface.borrow().is_some()
    }
}

/// Declarative sheet primitive with detents.
#[derive(Default)]
pub struct FakeNativeHost {
    log: EventLog,
    content: RefCell<Option<Rc<dyn Measurable>>>,
    on_user_dismiss: RefCell<Option<UserDismissHandler>>,
    request: RefCell<Option<NativeSheetRequest>>,
}

impl std::fmt::Debug for FakeNativeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeNativeHost")
            .field("presenting", &self.content.borrow().is_some())
            .field("request", &self.request.borrow())
            .finish()
    }
}

impl FakeNativeHost {
    #[must_use]
    pub fn new(log: EventLog) -> Rc<Self> {
        Rc::new(Self {
            log,
            ..Self::default()
        })
    }

    /// Measure the hosted content at `width`, as a layout pass would.
    pub fn layout(&self, width: f32) -> Option<Size> {
        let content = self.content.borrow().clone();
        content.map(|c| c.measure(SizeProposal::width(width)))
    }

    /// The user swipes the sheet away (only honored when allowed).
    pub fn swipe_down(&self) -> bool {
        let allowed = self
            .request
            .borrow()
            .as_ref()
            .is_some_and(|r| !r.interactive_dismiss_disabled);
        if !allowed {
            return false;
        }
        let handler = self.on_user_dismiss.borrow_mut().take();
        self.content.borrow_mut().take();
        if let Some(handler) = handler {
            handler();
        }
        true
    }

    #[must_use]
    pub fn request(&self) -> Option<NativeSheetRequest> {
        self.request.borrow().clone()
    }
}

impl NativeSheetHost for FakeNativeHost {
    fn present(
        &self,
        request: NativeSheetRequest,
        content: Rc<dyn Measurable>,
        on_user_dismiss: UserDismissHandler,
    ) {
        *self.content.borrow_mut() = Some(content);
        *self.on_user_dismiss.borrow_mut() = Some(on_user_dismiss);
        *self.request.borrow_mut() = Some(request.clone());
        self.log.push(HostEvent::NativePresented(request));
    }

    fn update(&self, request: NativeSheetRequest, content: Rc<dyn Measurable>) {
        *self.content.borrow_mut() = Some(content);
        *self.request.borrow_mut() = Some(request.clone());
        self.log.push(HostEvent::NativeUpdated(request));
    }

    fn dismiss(&self) {
        self.content.borrow_mut().take();
        self.on_user_dismiss.borrow_mut().take();
        self.log.push(HostEvent::NativeDismissed);
    }

    fn is_presenting(&self) -> bool {
        self.content.borrow().is_some()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Fake platform: hosts, log, clock, and an isolated configuration context.
#[derive(Debug)]
pub struct Harness {
    pub main: MainLoop,
    pub screen: Size,
    pub log: EventLog,
    pub modal: Rc<FakeModalHost>,
    pub native: Rc<FakeNativeHost>,
    pub context: ConfigContext,
    pub capabilities: PlatformCapabilities,
}

impl Harness {
    /// Harness for a platform without native detents.
    #[must_use]
    pub fn legacy() -> Self {
        Self::new(PlatformCapabilities::legacy(PHONE))
    }

    /// Harness for a platform with detents and styling.
    #[must_use]
    pub fn modern() -> Self {
        Self::new(PlatformCapabilities::modern(PHONE))
    }

    #[must_use]
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        let log = EventLog::new();
        Self {
            main: MainLoop::new(),
            screen: capabilities.screen_size,
            modal: FakeModalHost::new(log.clone()),
            native: FakeNativeHost::new(log.clone()),
            log,
            context: ConfigContext::new(),
            capabilities,
        }
    }

    #[must_use]
    pub fn presenter(&self) -> SheetPresenter {
        self.presenter_with(SheetMetrics::default())
    }

    #[must_use]
    pub fn presenter_with(&self, metrics: SheetMetrics) -> SheetPresenter {
        let native: Rc<dyn NativeSheetHost> = self.native.clone();
        let modal: Rc<dyn ModalHost> = self.modal.clone();
        SheetPresenter::new(self.main.clone(), self.capabilities, native, modal)
            .context(self.context.clone())
            .metrics(metrics)
    }

    /// Run the next turn (the show hop).
    pub fn hop(&self) -> usize {
        self.main.run_turn()
    }

    /// Advance far enough for animations and teardown to finish.
    pub fn settle(&self) -> usize {
        self.main.advance(SETTLE)
    }

    /// Lay out the custom sheet, if one is hosted.
    #[must_use]
    pub fn render(&self) -> Option<SheetLayout> {
        self.modal.render(self.screen)
    }
}
