#![no_main]

use std::rc::Rc;
use std::time::Duration;

use arbitrary::Arbitrary;
use fitsheet_runtime::{MainLoop, Observable};
use fitsheet_widgets::geometry::{Size, SizeProposal};
use fitsheet_widgets::measure::Measurable;
use fitsheet_widgets::sheet::{
    BottomSheet, ConfigContext, DismissTiming, SheetConfiguration, SheetEvent, SheetMetrics,
    SheetPhase,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Drag(f32),
    Release(f32),
    Tap(f32),
    Cancel,
    Flag(bool),
    Wait(u16),
    Layout { width: u16, height: u16 },
    Resize(f32),
}

#[derive(Debug, Arbitrary)]
struct Input {
    content_height: f32,
    dismiss_ratio: f32,
    max_over_drag: f32,
    allow_dismiss: bool,
    fixed_delay: bool,
    ops: Vec<Op>,
}

struct Content(std::cell::Cell<f32>);

impl Measurable for Content {
    fn measure(&self, proposal: SizeProposal) -> Size {
        Size::new(proposal.width.unwrap_or(0.0), self.0.get())
    }
}

fuzz_target!(|input: Input| {
    let main = MainLoop::new();
    let flag = Observable::new(true);
    let content = Rc::new(Content(std::cell::Cell::new(input.content_height)));
    let config = SheetConfiguration::new()
        .dismiss_ratio(input.dismiss_ratio)
        .max_over_drag(input.max_over_drag)
        .allow_dismiss(input.allow_dismiss);
    let timing = if input.fixed_delay {
        DismissTiming::legacy()
    } else {
        DismissTiming::AnimationSettled
    };
    let sheet = BottomSheet::from_shared(flag.clone(), main.clone(), content.clone())
        .context(ConfigContext::new())
        .configuration(config)
        .metrics(SheetMetrics::default().dismiss_timing(timing));
    sheet.mount();

    let mut screen = Size::new(390.0, 844.0);
    for op in input.ops.into_iter().take(256) {
        match op {
            Op::Drag(t) => {
                sheet.handle_event(SheetEvent::DragChanged { translation: t });
            }
            Op::Release(t) => {
                sheet.handle_event(SheetEvent::DragEnded { translation: t });
            }
            Op::Tap(y) => {
                sheet.handle_event(SheetEvent::Tap { y });
            }
            Op::Cancel => {
                sheet.handle_event(SheetEvent::Cancel);
            }
            Op::Flag(value) => flag.set(value),
            Op::Wait(ms) => {
                main.advance(Duration::from_millis(u64::from(ms)));
            }
            Op::Layout { width, height } => {
                screen = Size::new(f32::from(width), f32::from(height));
            }
            Op::Resize(h) => content.0.set(h),
        }
        let layout = sheet.layout(screen);
        assert!(layout.offset.is_finite());
        assert!((0.0..=1.0).contains(&layout.dim_opacity));
        if sheet.phase() == SheetPhase::Shown {
            let config = sheet.resolved_configuration();
            assert!(sheet.target_offset() >= 100.0 - config.max_over_drag - 0.01);
        }
    }

    flag.set(false);
    main.advance(Duration::from_secs(5));
    assert_eq!(sheet.phase(), SheetPhase::Dismissed);
});
