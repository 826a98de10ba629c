#![forbid(unsafe_code)]

//! The bottom sheet: configuration, motion, the drag engine, and the two
//! presentation paths.

pub mod animation;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod native;
pub mod presentation;

pub use animation::{AnimatedValue, DismissTiming, SpringCurve};
pub use bridge::{ContentFactory, ModalHost, ModalSurface, NonAnimatedModal, PresentationStyle};
pub use config::{
    BehaviorOverride, ConfigContext, ConfigOverride, DimStyle, DragIndicator, SheetBackground,
    SheetConfiguration, SheetMetrics,
};
pub use engine::{
    BottomSheet, DismissCompletion, DismissReason, DismissableView, SHEET_HIT_BACKDROP,
    SHEET_HIT_CONTENT, SheetAction, SheetEvent, SheetLayout, SheetPhase,
};
pub use native::{
    ContentInteraction, Detent, NativeSheet, NativeSheetHost, NativeSheetRequest,
    NativeSheetStyling, UserDismissHandler,
};
pub use presentation::{
    Identifiable, PlatformCapabilities, PresentOptions, PresentationDriver, PresentationStrategy,
    Presented, SheetPresentation, SheetPresenter,
};
