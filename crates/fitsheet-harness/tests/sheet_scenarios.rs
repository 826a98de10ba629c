#![forbid(unsafe_code)]

//! End-to-end scenarios for the gesture-driven path: a legacy platform, a
//! fake modal host, and virtual time.

use fitsheet_harness::{FixedContent, Harness, HostEvent, assert_ordered, shared};
use fitsheet_runtime::Observable;
use fitsheet_widgets::sheet::{
    DismissReason, DismissableView, DragIndicator, PresentOptions, SheetAction, SheetConfiguration,
    SheetEvent, SheetPhase, SHEET_HIT_BACKDROP,
};
use fitsheet_widgets::geometry::Point;

const PAD: f32 = 100.0;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.5
}

/// Stack of 400 (300 content + 100 padding, no indicator), ratio 0.5.
fn scenario_config() -> SheetConfiguration {
    SheetConfiguration::new()
        .dismiss_ratio(0.5)
        .indicator(DragIndicator::hidden())
}

// ============================================================================
// Scenario 1: flag false -> true
// ============================================================================

#[test]
fn flag_shows_sheet_after_one_hop() {
    let h = Harness::legacy();
    let flag = Observable::new(false);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    assert!(h.modal.sheet().is_none());

    flag.set(true);
    let sheet = h.modal.sheet().expect("modal presented synchronously");
    assert_eq!(h.log.events(), vec![HostEvent::ModalPresented { animated: false }]);

    // First frame renders off-screen.
    let _ = h.render();
    assert_eq!(sheet.phase(), SheetPhase::Hidden);
    assert!(!sheet.is_visually_shown());
    assert!(close(sheet.offset(), sheet.content_height() + PAD));

    h.hop();
    assert_eq!(sheet.phase(), SheetPhase::Shown);
    assert!(sheet.is_visually_shown());
    assert!(sheet.is_animating());

    h.settle();
    assert!(close(sheet.offset(), PAD));
    let layout = h.render().expect("still presented");
    assert!(close(layout.offset, PAD));
    assert!(layout.dim_opacity > 0.0);
}

// ============================================================================
// Scenario 2: drag past the threshold
// ============================================================================

#[test]
fn drag_past_threshold_dismisses() {
    let h = Harness::legacy();
    h.context.set(Some(scenario_config()));
    let flag = Observable::new(true);
    let _watch = h.log.watch(&flag);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(
        &flag,
        PresentOptions::new().on_dismiss(h.log.on_dismiss()),
        shared(&content),
    );
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    assert_eq!(sheet.content_height(), 400.0);
    assert_eq!(sheet.dismiss_threshold(), 150.0);

    assert_eq!(sheet.handle_event(SheetEvent::DragChanged { translation: 120.0 }), None);
    assert!(close(sheet.target_offset(), PAD + 120.0));
    assert_eq!(sheet.handle_event(SheetEvent::DragChanged { translation: 200.0 }), None);
    assert!(close(sheet.offset(), PAD + 200.0));

    assert_eq!(
        sheet.handle_event(SheetEvent::DragEnded { translation: 200.0 }),
        Some(SheetAction::Dismiss(DismissReason::Drag))
    );
    assert_eq!(sheet.phase(), SheetPhase::Dismissing);
    assert!(close(sheet.target_offset(), 400.0 + PAD));
    assert!(flag.get());

    h.settle();
    assert!(!flag.get());
    assert!(h.modal.sheet().is_none());
    assert_ordered!(h.log, [
        HostEvent::Flag(false),
        HostEvent::OnDismiss,
        HostEvent::ModalDismissed { animated: false },
    ]);
    assert_eq!(h.log.count(|e| *e == HostEvent::OnDismiss), 1);
}

#[test]
fn drag_within_threshold_snaps_back() {
    let h = Harness::legacy();
    h.context.set(Some(scenario_config()));
    let flag = Observable::new(true);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    sheet.handle_event(SheetEvent::DragChanged { translation: 150.0 });
    assert_eq!(
        sheet.handle_event(SheetEvent::DragEnded { translation: 150.0 }),
        Some(SheetAction::SnapBack)
    );
    assert_eq!(sheet.translation(), 0.0);
    h.settle();
    assert!(close(sheet.offset(), PAD));
    assert!(flag.get());
}

// ============================================================================
// Scenario 3: allow_dismiss = false
// ============================================================================

#[test]
fn disabled_dismissal_ignores_drag_and_backdrop() {
    let h = Harness::legacy();
    h.context.set(Some(scenario_config()));
    let flag = Observable::new(true);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(
        &flag,
        PresentOptions::new().allow_dismiss(false).on_dismiss(h.log.on_dismiss()),
        shared(&content),
    );
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    sheet.handle_event(SheetEvent::DragChanged { translation: 200.0 });
    assert_eq!(
        sheet.handle_event(SheetEvent::DragEnded { translation: 200.0 }),
        Some(SheetAction::DismissBlocked)
    );

    let layout = h.render().expect("presented");
    assert_eq!(layout.hit_test(Point::new(10.0, 20.0)), SHEET_HIT_BACKDROP);
    assert_eq!(
        sheet.handle_event(SheetEvent::Tap { y: 20.0 }),
        Some(SheetAction::DismissBlocked)
    );
    assert_eq!(sheet.handle_event(SheetEvent::Cancel), Some(SheetAction::DismissBlocked));

    h.settle();
    assert!(flag.get());
    assert_eq!(sheet.phase(), SheetPhase::Shown);
    assert!(close(sheet.offset(), PAD));
    assert_eq!(h.log.count(|e| *e == HostEvent::OnDismiss), 0);

    // The host application can still close it.
    flag.set(false);
    h.settle();
    assert!(h.modal.sheet().is_none());
    assert_eq!(h.log.count(|e| *e == HostEvent::OnDismiss), 1);
}

#[test]
fn backdrop_tap_dismisses_when_allowed() {
    let h = Harness::legacy();
    let flag = Observable::new(true);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    assert_eq!(
        sheet.handle_event(SheetEvent::Tap { y: 20.0 }),
        Some(SheetAction::Dismiss(DismissReason::Backdrop))
    );
    // Taps on the sheet itself are swallowed.
    let other = h.modal.sheet().expect("still hosted while animating out");
    assert_eq!(other.handle_event(SheetEvent::Tap { y: 800.0 }), None);
    h.settle();
    assert!(!flag.get());
}

// ============================================================================
// Idempotence and ordering
// ============================================================================

#[test]
fn repeated_dismiss_runs_each_completion_once() {
    let h = Harness::legacy();
    let flag = Observable::new(true);
    let _watch = h.log.watch(&flag);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    sheet.dismiss(Some(h.log.completion("first")));
    sheet.dismiss(Some(h.log.completion("second")));
    flag.set(false);
    sheet.dismiss(None);
    h.settle();

    assert_eq!(h.log.count(|e| *e == HostEvent::Completion("first")), 1);
    assert_eq!(h.log.count(|e| *e == HostEvent::Completion("second")), 1);
    assert_eq!(h.log.count(|e| matches!(e, HostEvent::ModalDismissed { .. })), 1);
}

#[test]
fn completion_runs_before_flag_is_observed_false() {
    let h = Harness::legacy();
    let flag = Observable::new(true);
    let _watch = h.log.watch(&flag);
    let content = FixedContent::new(300.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    let sheet = h.modal.sheet().expect("presented");
    let _ = h.render();
    h.hop();
    h.settle();

    sheet.dismiss(Some(h.log.completion("cleanup")));
    h.settle();
    let completion = h.log.position(&HostEvent::Completion("cleanup"));
    let cleared = h.log.position(&HostEvent::Flag(false));
    match (completion, cleared) {
        (Some(c), Some(f)) => assert!(c < f, "completion at {c}, flag cleared at {f}"),
        other => panic!("missing events: {other:?}"),
    }
}

#[test]
fn reopening_after_dismissal_presents_a_fresh_sheet() {
    let h = Harness::legacy();
    let flag = Observable::new(true);
    let content = FixedContent::new(200.0);
    let _presentation = h.presenter().present(&flag, PresentOptions::new(), shared(&content));
    let first = h.modal.sheet().expect("presented");
    h.hop();
    h.settle();

    flag.set(false);
    h.settle();
    flag.set(true);
    let second = h.modal.sheet().expect("presented again");
    assert!(!first.ptr_eq(&second));
    h.hop();
    h.settle();
    assert_eq!(second.phase(), SheetPhase::Shown);
    assert_eq!(h.log.count(|e| matches!(e, HostEvent::ModalPresented { .. })), 2);
}
