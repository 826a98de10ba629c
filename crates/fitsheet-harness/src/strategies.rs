#![forbid(unsafe_code)]

//! `proptest` strategies for driving sheets with arbitrary input.

use std::time::Duration;

use proptest::prelude::*;

/// One step of a scripted interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Drag sample without release.
    Drag(f32),
    /// Drag sample followed by release at the same translation.
    Release(f32),
    /// Tap at a container-relative `y`.
    Tap(f32),
    Cancel,
    /// Set the presentation flag.
    Flag(bool),
    /// Let virtual time pass.
    Wait(Duration),
}

/// Plausible drag translations, including over-drag and long pulls.
pub fn translation() -> impl Strategy<Value = f32> {
    prop_oneof![-200.0f32..0.0, 0.0f32..300.0, 300.0f32..1200.0]
}

pub fn step(screen_height: f32) -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => translation().prop_map(Step::Drag),
        3 => translation().prop_map(Step::Release),
        2 => (0.0f32..screen_height).prop_map(Step::Tap),
        1 => Just(Step::Cancel),
        2 => any::<bool>().prop_map(Step::Flag),
        3 => (0u64..600).prop_map(|ms| Step::Wait(Duration::from_millis(ms))),
    ]
}

/// A script of up to `max_len` steps.
pub fn script(screen_height: f32, max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(screen_height), 1..max_len)
}
