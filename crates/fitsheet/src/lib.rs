#![forbid(unsafe_code)]

//! fitsheet: bottom sheets that fit their content.
//!
//! Most users only need the [`prelude`]:
//!
//! ```ignore
//! use fitsheet::prelude::*;
//!
//! let presenter = SheetPresenter::new(main, PlatformCapabilities::legacy(screen), native, modal);
//! let presentation = presenter.present(&is_shown, PresentOptions::new(), || content());
//! ```

pub use fitsheet_runtime as runtime;
pub use fitsheet_widgets as widgets;

pub use fitsheet_runtime::{MainLoop, Observable, Subscription};
pub use fitsheet_widgets::{
    BottomSheet, ConfigContext, GeometryProbe, GeometryReader, Measurable, PlatformCapabilities,
    PresentOptions, Rgba, SheetConfiguration, SheetEvent, SheetMetrics, SheetPresentation,
    SheetPresenter, Size, SizeProposal,
};
#[cfg(feature = "policy-config")]
pub use fitsheet_widgets::{PolicyError, SheetPolicy};

pub mod prelude {
    //! Everything needed to present a sheet.

    pub use fitsheet_runtime::{BindingScope, MainLoop, Observable, Subscription};
    pub use fitsheet_widgets::color::Rgba;
    pub use fitsheet_widgets::geometry::{Point, Size, SizeProposal};
    pub use fitsheet_widgets::measure::Measurable;
    pub use fitsheet_widgets::sheet::{
        BottomSheet, ConfigContext, DimStyle, DismissTiming, DragIndicator, Identifiable,
        ModalHost, ModalSurface, NativeSheetHost, NativeSheetRequest, PlatformCapabilities,
        PresentOptions, SheetAction, SheetBackground, SheetConfiguration, SheetEvent,
        SheetLayout, SheetMetrics, SheetPresentation, SheetPresenter,
    };
}
