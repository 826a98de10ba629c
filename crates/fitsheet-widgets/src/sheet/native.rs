#![forbid(unsafe_code)]

//! Declarative native sheet path.
//!
//! On platforms with detents the host's own sheet does the animation,
//! gesture handling and chrome. This module only translates a
//! [`SheetConfiguration`] into a [`NativeSheetRequest`] and keeps it current:
//!
//! - scrollable content rests at the medium detent;
//! - fixed content gets an exact-height detent fed by Geometry Feedback,
//!   re-sent every time the measured height changes;
//! - `allow_dismiss` maps to `interactive_dismiss_disabled = !allow_dismiss`;
//! - styling is sent only when the platform supports it;
//! - a change of the ambient configuration re-sends the request.
//!
//! A user-driven dismissal reported by the host clears the presentation
//! flag.

use std::cell::RefCell;
use std::rc::Rc;

use fitsheet_runtime::{BindingScope, Observable};
use tracing::{debug, trace};

use crate::color::Rgba;
use crate::measure::{GeometryProbe, GeometryReader, Measurable};
use crate::sheet::bridge::ContentFactory;
use crate::sheet::config::{BehaviorOverride, ConfigContext, SheetConfiguration};

/// A resting height for a native sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detent {
    /// Roughly half the screen.
    Medium,
    /// Full height.
    Large,
    /// Exact height.
    Height(f32),
}

/// How drags inside the content interact with the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentInteraction {
    /// Grow the sheet first, then scroll the content.
    #[default]
    Resizes,
    /// Scroll the content without resizing.
    Scrolls,
}

/// Chrome for platforms that support presentation styling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeSheetStyling {
    pub background: Rgba,
    pub corner_radius: f32,
    pub background_interaction_disabled: bool,
    pub content_interaction: ContentInteraction,
}

/// Everything the native sheet needs to present or update.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSheetRequest {
    pub detents: Vec<Detent>,
    pub interactive_dismiss_disabled: bool,
    pub drag_indicator_visible: bool,
    pub styling: Option<NativeSheetStyling>,
}

impl NativeSheetRequest {
    /// Build a request from a resolved configuration and the latest
    /// measured content height.
    #[must_use]
    pub fn build(config: &SheetConfiguration, measured_height: f32, styled: bool) -> Self {
        let detent = if config.scrollable {
            Detent::Medium
        } else {
            Detent::Height(measured_height.max(0.0))
        };
        Self {
            detents: vec![detent],
            interactive_dismiss_disabled: !config.allow_dismiss,
            drag_indicator_visible: config.indicator.visible,
            styling: styled.then(|| NativeSheetStyling {
                background: config.background.color,
                corner_radius: config.background.corner_radius,
                background_interaction_disabled: true,
                content_interaction: ContentInteraction::Resizes,
            }),
        }
    }
}

/// Called by the host when the user dismisses the sheet (swipe, tap-out).
pub type UserDismissHandler = Rc<dyn Fn()>;

/// The host framework's declarative sheet primitive.
pub trait NativeSheetHost {
    fn present(&self, request: NativeSheetRequest, content: Rc<dyn Measurable>, on_user_dismiss: UserDismissHandler);
    /// Apply a changed request or content to the presented sheet.
    fn update(&self, request: NativeSheetRequest, content: Rc<dyn Measurable>);
    fn dismiss(&self);
    fn is_presenting(&self) -> bool;
}

struct NativeInner {
    host: Rc<dyn NativeSheetHost>,
    is_presented: Observable<bool>,
    factory: ContentFactory,
    content: Option<Rc<dyn Measurable>>,
    explicit: Option<SheetConfiguration>,
    behavior: BehaviorOverride,
    context: ConfigContext,
    styled: bool,
    probe: GeometryProbe,
    presenting: bool,
    scope: BindingScope,
}

impl NativeInner {
    fn config(&self) -> SheetConfiguration {
        self.context.resolve_with(self.explicit.as_ref(), self.behavior)
    }

    fn request(&self) -> NativeSheetRequest {
        NativeSheetRequest::build(&self.config(), self.probe.height(), self.styled)
    }
}

/// Drives a [`NativeSheetHost`] from a presentation flag.
#[derive(Clone)]
pub struct NativeSheet {
    inner: Rc<RefCell<NativeInner>>,
}

impl std::fmt::Debug for NativeSheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("NativeSheet")
            .field("presenting", &inner.presenting)
            .field("measured_height", &inner.probe.height())
            .finish_non_exhaustive()
    }
}

impl NativeSheet {
    pub fn new(
        is_presented: Observable<bool>,
        host: Rc<dyn NativeSheetHost>,
        content: ContentFactory,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NativeInner {
                host,
                is_presented,
                factory: content,
                content: None,
                explicit: None,
                behavior: BehaviorOverride::NONE,
                context: ConfigContext::global(),
                styled: false,
                probe: GeometryProbe::new(),
                presenting: false,
                scope: BindingScope::new(),
            })),
        }
    }

    #[must_use]
    pub fn configuration(self, config: SheetConfiguration) -> Self {
        self.inner.borrow_mut().explicit = Some(config);
        self
    }

    /// Flags sent with every request over all configuration tiers.
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

    /// Send presentation styling with every request.
    #[must_use]
    pub fn styled(self, styled: bool) -> Self {
        self.inner.borrow_mut().styled = styled;
        self
    }

    /// Follow the flag, the measured height and the ambient configuration.
    pub fn attach(&self) {
        if !self.inner.borrow().scope.is_empty() {
            return;
        }
        let (flag, probe, context) = {
            let inner = self.inner.borrow();
            (inner.is_presented.clone(), inner.probe.clone(), inner.context.clone())
        };

        let weak = Rc::downgrade(&self.inner);
        let flag_watch = flag.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.update();
            }
        });
        let weak = Rc::downgrade(&self.inner);
        let height_watch = probe.on_change(move |height| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.height_changed(height);
            }
        });
        let weak = Rc::downgrade(&self.inner);
        let config_watch = context.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.configuration_changed();
            }
        });
        {
            let mut inner = self.inner.borrow_mut();
            inner.scope.hold(flag_watch);
            inner.scope.hold(height_watch);
            inner.scope.hold(config_watch);
        }
        self.update();
    }

    /// Reconcile the host with the flag; while presented, rebuild the
    /// content and re-send the request.
    pub fn update(&self) {
        let (shown, presenting) = {
            let inner = self.inner.borrow();
            (inner.is_presented.get(), inner.presenting)
        };
        match (shown, presenting) {
            (true, false) => self.present(),
            (true, true) => self.refresh_content(),
            (false, true) => {
                let host = {
                    let mut inner = self.inner.borrow_mut();
                    inner.presenting = false;
                    Rc::clone(&inner.host)
                };
                if host.is_presenting() {
                    debug!("native sheet dismissed by flag");
                    host.dismiss();
                }
            }
            (false, false) => {}
        }
    }

    fn build_content(&self) -> Rc<dyn Measurable> {
        let (factory, probe) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.factory), inner.probe.clone())
        };
        let content: Rc<dyn Measurable> = Rc::new(GeometryReader::new(factory(), probe));
        self.inner.borrow_mut().content = Some(Rc::clone(&content));
        content
    }

    fn present(&self) {
        let content = self.build_content();
        let (host, request) = {
            let mut inner = self.inner.borrow_mut();
            inner.presenting = true;
            (Rc::clone(&inner.host), inner.request())
        };
        let weak = Rc::downgrade(&self.inner);
        let on_user_dismiss: UserDismissHandler = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.user_dismissed();
            }
        });
        debug!(detents = ?request.detents, interactive_dismiss_disabled = request.interactive_dismiss_disabled, "presenting native sheet");
        host.present(request, content, on_user_dismiss);
    }

    fn refresh_content(&self) {
        let content = self.build_content();
        self.send_update(content);
    }

    fn send_update(&self, content: Rc<dyn Measurable>) {
        let (host, request) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.host), inner.request())
        };
        trace!(detents = ?request.detents, "native sheet request updated");
        host.update(request, content);
    }

    fn height_changed(&self, height: f32) {
        let pending = {
            let inner = self.inner.borrow();
            let scrollable = inner.config().scrollable;
            if inner.presenting && !scrollable {
                inner.content.clone()
            } else {
                None
            }
        };
        if let Some(content) = pending {
            debug!(height, "fitting native sheet to measured height");
            self.send_update(content);
        }
    }

    fn configuration_changed(&self) {
        let pending = {
            let inner = self.inner.borrow();
            if inner.presenting {
                inner.content.clone()
            } else {
                None
            }
        };
        if let Some(content) = pending {
            debug!("ambient configuration changed, re-sending native request");
            self.send_update(content);
        }
    }

    fn user_dismissed(&self) {
        let flag = {
            let mut inner = self.inner.borrow_mut();
            if !inner.presenting {
                return;
            }
            inner.presenting = false;
            inner.is_presented.clone()
        };
        debug!("native sheet dismissed by user");
        flag.set(false);
    }

    #[must_use]
    pub fn is_presenting(&self) -> bool {
        self.inner.borrow().presenting
    }

    /// Latest measured content height.
    #[must_use]
    pub fn measured_height(&self) -> f32 {
        self.inner.borrow().probe.height()
    }

    /// The request that would be sent right now.
    #[must_use]
    pub fn current_request(&self) -> NativeSheetRequest {
        self.inner.borrow().request()
    }

    #[must_use]
    pub fn is_presented(&self) -> Observable<bool> {
        self.inner.borrow().is_presented.clone()
    }
}
