#![forbid(unsafe_code)]

//! Present the gesture-driven sheet as a true modal without the host's own
//! transition.
//!
//! The host's modal primitive gives input blocking and z-ordering; all
//! visual motion comes from [`BottomSheet`]. So presentation is always
//! non-animated, and teardown happens in two steps: the hosted sheet plays
//! its exit animation first, and only its dismiss completion removes the
//! native modal layer.
//!
//! # Invariants
//!
//! 1. At most one native modal is presented per [`NonAnimatedModal`].
//! 2. Every presentation request builds a fresh [`BottomSheet`].
//! 3. The native layer is never dismissed before the hosted sheet's
//!    completion fires.

use std::cell::RefCell;
use std::rc::Rc;

use fitsheet_runtime::{MainLoop, Observable, Subscription};
use tracing::debug;

use crate::color::Rgba;
use crate::measure::Measurable;
use crate::sheet::config::{BehaviorOverride, ConfigContext, SheetConfiguration, SheetMetrics};
use crate::sheet::engine::{BottomSheet, DismissableView};

/// How the host should present a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationStyle {
    /// Host-chosen chrome and transition.
    #[default]
    Automatic,
    /// No host chrome; the surface draws everything itself.
    Custom,
}

/// What gets handed to the host's modal primitive.
#[derive(Debug, Clone)]
pub struct ModalSurface {
    pub sheet: BottomSheet,
    pub background: Rgba,
    pub style: PresentationStyle,
}

impl ModalSurface {
    /// Transparent, custom-styled surface hosting `sheet`.
    #[must_use]
    pub fn hosting(sheet: BottomSheet) -> Self {
        Self {
            sheet,
            background: Rgba::TRANSPARENT,
            style: PresentationStyle::Custom,
        }
    }
}

/// The host framework's imperative modal presentation primitive.
pub trait ModalHost {
    /// Present `surface` above all current content.
    fn present(&self, surface: ModalSurface, animated: bool);
    /// Remove the presented surface.
    fn dismiss(&self, animated: bool);
    /// Whether a surface is currently presented.
    fn is_presenting(&self) -> bool;
}

/// Produces the content hosted by each new sheet.
pub type ContentFactory = Rc<dyn Fn() -> Rc<dyn Measurable>>;

struct ModalInner {
    host: Rc<dyn ModalHost>,
    is_presented: Observable<bool>,
    main: MainLoop,
    content: ContentFactory,
    explicit: Option<SheetConfiguration>,
    behavior: BehaviorOverride,
    context: ConfigContext,
    metrics: SheetMetrics,
    presented: Option<BottomSheet>,
    watch: Option<Subscription>,
}

/// Drives a [`ModalHost`] from a presentation flag.
#[derive(Clone)]
pub struct NonAnimatedModal {
    inner: Rc<RefCell<ModalInner>>,
}

impl std::fmt::Debug for NonAnimatedModal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("NonAnimatedModal")
            .field("is_presented", &inner.is_presented.get())
            .field("host_presenting", &inner.host.is_presenting())
            .finish_non_exhaustive()
    }
}

impl NonAnimatedModal {
    pub fn new(
        is_presented: Observable<bool>,
        main: MainLoop,
        host: Rc<dyn ModalHost>,
        content: ContentFactory,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ModalInner {
                host,
                is_presented,
                main,
                content,
                explicit: None,
                behavior: BehaviorOverride::NONE,
                context: ConfigContext::global(),
                metrics: SheetMetrics::default(),
                presented: None,
                watch: None,
            })),
        }
    }

    #[must_use]
    pub fn configuration(self, config: SheetConfiguration) -> Self {
        self.inner.borrow_mut().explicit = Some(config);
        self
    }

    /// Flags applied to every hosted sheet over all configuration tiers.
    #[must_use]
    pub fn behavior(self, behavior: BehaviorOverride) -> Self {
        self.inner.borrow_mut().behavior = behavior;
        self
    }

    #[must_use]
    pub fn context(self, context: ConfigContext) -> Self {
        self.inner.borrow_mut().context = context;
        self
    }

    #[must_use]
    pub fn metrics(self, metrics: SheetMetrics) -> Self {
        self.inner.borrow_mut().metrics = metrics;
        self
    }

    /// Follow the presentation flag and run the first update pass.
    pub fn attach(&self) {
        if self.inner.borrow().watch.is_some() {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let flag = self.inner.borrow().is_presented.clone();
        let watch = flag.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.update();
            }
        });
        self.inner.borrow_mut().watch = Some(watch);
        self.update();
    }

    /// Reconcile the native layer with the flag.
    ///
    /// While presented this refreshes the hosted content in place.
    pub fn update(&self) {
        let (presented_flag, host, sheet) = {
            let inner = self.inner.borrow();
            (
                inner.is_presented.get(),
                Rc::clone(&inner.host),
                inner.presented.clone(),
            )
        };

        match (presented_flag, sheet) {
            (true, Some(sheet)) => {
                let factory = Rc::clone(&self.inner.borrow().content);
                sheet.set_content(factory());
            }
            (true, None) => self.present_fresh(),
            (false, Some(sheet)) if host.is_presenting() => {
                debug!("hosted sheet dismissing before native teardown");
                let weak = Rc::downgrade(&self.inner);
                sheet.dismiss(Some(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Self { inner }.teardown();
                    }
                })));
            }
            (false, Some(_)) => {
                self.inner.borrow_mut().presented = None;
            }
            (false, None) => {}
        }
    }

    fn present_fresh(&self) {
        let factory = Rc::clone(&self.inner.borrow().content);
        let content = factory();
        let (sheet, host) = {
            let inner = self.inner.borrow();
            let sheet = BottomSheet::from_shared(
                inner.is_presented.clone(),
                inner.main.clone(),
                content,
            )
            .context(inner.context.clone())
            .behavior(inner.behavior)
            .metrics(inner.metrics);
            let sheet = match &inner.explicit {
                Some(config) => sheet.configuration(config.clone()),
                None => sheet,
            };
            (sheet, Rc::clone(&inner.host))
        };
        self.inner.borrow_mut().presented = Some(sheet.clone());
        sheet.mount();
        debug!("presenting hosted sheet without native transition");
        host.present(ModalSurface::hosting(sheet), false);
    }

    fn teardown(&self) {
        let host = {
            let mut inner = self.inner.borrow_mut();
            inner.presented = None;
            Rc::clone(&inner.host)
        };
        if host.is_presenting() {
            debug!("native modal layer torn down");
            host.dismiss(false);
        }
    }

    /// Whether the native layer currently shows a surface.
    #[must_use]
    pub fn is_presenting(&self) -> bool {
        let host = Rc::clone(&self.inner.borrow().host);
        host.is_presenting()
    }

    /// The sheet hosted by the current presentation.
    #[must_use]
    pub fn presented_sheet(&self) -> Option<BottomSheet> {
        self.inner.borrow().presented.clone()
    }

    /// The flag this modal follows.
    #[must_use]
    pub fn is_presented(&self) -> Observable<bool> {
        self.inner.borrow().is_presented.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Size, SizeProposal};
    use crate::sheet::engine::{SheetEvent, SheetPhase};
    use std::cell::Cell;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHost {
        presented: RefCell<Option<ModalSurface>>,
        log: RefCell<Vec<String>>,
    }

    impl ModalHost for RecordingHost {
        fn present(&self, surface: ModalSurface, animated: bool) {
            self.log.borrow_mut().push(format!("present animated={animated}"));
            *self.presented.borrow_mut() = Some(surface);
        }

        fn dismiss(&self, animated: bool) {
            self.log.borrow_mut().push(format!("dismiss animated={animated}"));
            self.presented.borrow_mut().take();
        }

        fn is_presenting(&self) -> bool {
            self.presented.borrow().is_some()
        }
    }

    struct Fixed(f32);

    impl Measurable for Fixed {
        fn measure(&self, proposal: SizeProposal) -> Size {
            Size::new(proposal.width.unwrap_or(0.0), self.0)
        }
    }

    fn modal(flag: &Observable<bool>, main: &MainLoop, host: &Rc<RecordingHost>) -> NonAnimatedModal {
        let host: Rc<dyn ModalHost> = host.clone();
        let modal = NonAnimatedModal::new(
            flag.clone(),
            main.clone(),
            host,
            Rc::new(|| Rc::new(Fixed(300.0)) as Rc<dyn Measurable>),
        )
        .context(ConfigContext::new());
        modal.attach();
        modal
    }

    #[test]
    fn presents_without_transition() {
        let (main, flag, host) = (MainLoop::new(), Observable::new(false), Rc::new(RecordingHost::default()));
        let modal = modal(&flag, &main, &host);
        assert!(!modal.is_presenting());

        flag.set(true);
        assert_eq!(*host.log.borrow(), vec!["present animated=false"]);
        let surface = host.presented.borrow().clone();
        let surface = surface.map(|s| (s.background, s.style));
        assert_eq!(surface, Some((Rgba::TRANSPARENT, PresentationStyle::Custom)));
    }

    #[test]
    fn native_layer_outlives_exit_animation() {
        let (main, flag, host) = (MainLoop::new(), Observable::new(true), Rc::new(RecordingHost::default()));
        let modal = modal(&flag, &main, &host);
        main.advance(Duration::from_secs(1));
        let sheet = modal.presented_sheet();
        assert!(sheet.is_some());

        flag.set(false);
        assert!(modal.is_presenting());
        assert_eq!(sheet.as_ref().map(BottomSheet::phase), Some(SheetPhase::Dismissing));

        main.advance(Duration::from_secs(2));
        assert!(!modal.is_presenting());
        assert!(modal.presented_sheet().is_none());
        assert_eq!(host.log.borrow().last().map(String::as_str), Some("dismiss animated=false"));
    }

    #[test]
    fn user_dismissal_tears_down_native_layer() {
        let (main, flag, host) = (MainLoop::new(), Observable::new(true), Rc::new(RecordingHost::default()));
        let modal = modal(&flag, &main, &host);
        main.advance(Duration::from_secs(1));
        let sheet = modal.presented_sheet();
        let sheet = sheet.as_ref();
        assert!(sheet.is_some());

        if let Some(sheet) = sheet {
            sheet.handle_event(SheetEvent::Cancel);
        }
        main.advance(Duration::from_secs(2));
        assert!(!flag.get());
        assert!(!modal.is_presenting());
    }

    #[test]
    fn each_presentation_builds_a_fresh_sheet() {
        let (main, flag, host) = (MainLoop::new(), Observable::new(true), Rc::new(RecordingHost::default()));
        let modal = modal(&flag, &main, &host);
        let first = modal.presented_sheet();
        flag.set(false);
        main.advance(Duration::from_secs(2));
        flag.set(true);
        let second = modal.presented_sheet();
        match (first, second) {
            (Some(a), Some(b)) => assert!(!a.ptr_eq(&b)),
            other => panic!("expected two presentations, got {other:?}"),
        }
    }

    #[test]
    fn update_while_presented_refreshes_content_in_place() {
        let (main, flag, host) = (MainLoop::new(), Observable::new(true), Rc::new(RecordingHost::default()));
        let builds = Rc::new(Cell::new(0));
        let b = Rc::clone(&builds);
        let host_dyn: Rc<dyn ModalHost> = host.clone();
        let modal = NonAnimatedModal::new(
            flag.clone(),
            main,
            host_dyn,
            Rc::new(move || {
                b.set(b.get() + 1);
                Rc::new(Fixed(200.0)) as Rc<dyn Measurable>
            }),
        )
        .context(ConfigContext::new());
        modal.attach();
        let sheet = modal.presented_sheet();
        modal.update();
        assert_eq!(builds.get(), 2);
        assert_eq!(host.log.borrow().len(), 1);
        match (sheet, modal.presented_sheet()) {
            (Some(a), Some(b)) => assert!(a.ptr_eq(&b)),
            other => panic!("expected the same sheet, got {other:?}"),
        }
    }
}
