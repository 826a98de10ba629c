#![forbid(unsafe_code)]

//! Sheet defaults loaded from TOML or JSON policy files.
//!
//! A policy has two optional tables: `[sheet]` maps onto
//! [`SheetConfiguration`], `[motion]` onto [`SheetMetrics`]. Missing keys
//! keep the built-in defaults.
//!
//! ```toml
//! [sheet]
//! dismiss_ratio = 0.3
//! background = "#F2F2F7"
//!
//! [motion]
//! dismiss_delay_ms = 150
//! ```
//!
//! # Failure Modes
//!
//! Unlike the code-built configuration (which clamps), a policy is
//! validated up front; every out-of-range value is a
//! [`PolicyError::Invalid`] naming the offending key.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::Rgba;
use crate::sheet::animation::{DismissTiming, SpringCurve};
use crate::sheet::config::{
    DimStyle, DragIndicator, SheetBackground, SheetConfiguration, SheetMetrics,
};

/// Error loading or validating a [`SheetPolicy`].
#[derive(Debug)]
pub enum PolicyError {
    /// The policy file could not be read.
    Io(std::io::Error),
    Toml(toml::de::Error),
    Json(serde_json::Error),
    /// A value parsed but is out of range.
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read sheet policy: {err}"),
            Self::Toml(err) => write!(f, "invalid TOML sheet policy: {err}"),
            Self::Json(err) => write!(f, "invalid JSON sheet policy: {err}"),
            Self::Invalid { field, reason } => write!(f, "invalid sheet policy `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Toml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for PolicyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// `[sheet]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetSection {
    pub dismiss_ratio: Option<f32>,
    pub max_over_drag: Option<f32>,
    pub allow_dismiss: Option<bool>,
    pub scrollable: Option<bool>,
    /// `#RRGGBB` or `#RRGGBBAA`.
    pub background: Option<String>,
    pub corner_radius: Option<f32>,
    pub dim_color: Option<String>,
    pub dim_opacity: Option<f32>,
    pub show_indicator: Option<bool>,
}

/// `[motion]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionSection {
    pub bottom_padding: Option<f32>,
    pub content_max_height_ratio: Option<f32>,
    pub spring_response: Option<f32>,
    pub spring_damping: Option<f32>,
    /// Fixed teardown delay; absent means teardown on animation settle.
    pub dismiss_delay_ms: Option<u64>,
    pub frame_interval_ms: Option<u64>,
}

/// Declarative sheet defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetPolicy {
    pub sheet: SheetSection,
    pub motion: MotionSection,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PolicyError {
    PolicyError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_range(field: &'static str, value: Option<f32>, min: f32, max: f32) -> Result<(), PolicyError> {
    match value {
        Some(v) if !v.is_finite() => Err(invalid(field, "must be finite")),
        Some(v) if v < min || v > max => Err(invalid(field, format!("{v} is outside [{min}, {max}]"))),
        _ => Ok(()),
    }
}

fn parse_color(field: &'static str, value: Option<&str>) -> Result<Option<Rgba>, PolicyError> {
    value
        .map(|text| Rgba::from_hex(text).ok_or_else(|| invalid(field, format!("`{text}` is not a hex color"))))
        .transpose()
}

impl SheetPolicy {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(text).map_err(PolicyError::Toml)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Parse and validate JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(text).map_err(PolicyError::Json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let policy = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            Some("toml") => Self::from_toml_str(&text)?,
            other => {
                return Err(invalid(
                    "path",
                    format!("unsupported policy extension {other:?}, expected .toml or .json"),
                ));
            }
        };
        debug!(path = %path.display(), "sheet policy loaded");
        Ok(policy)
    }

    /// Check every present value.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let sheet = &self.sheet;
        check_range("sheet.dismiss_ratio", sheet.dismiss_ratio, 0.0, 1.0)?;
        check_range("sheet.max_over_drag", sheet.max_over_drag, 0.0, f32::MAX)?;
        check_range("sheet.corner_radius", sheet.corner_radius, 0.0, f32::MAX)?;
        check_range("sheet.dim_opacity", sheet.dim_opacity, 0.0, 1.0)?;
        parse_color("sheet.background", sheet.background.as_deref())?;
        parse_color("sheet.dim_color", sheet.dim_color.as_deref())?;

        let motion = &self.motion;
        check_range("motion.bottom_padding", motion.bottom_padding, 0.0, f32::MAX)?;
        check_range("motion.content_max_height_ratio", motion.content_max_height_ratio, 0.0, 1.0)?;
        check_range("motion.spring_response", motion.spring_response, f32::MIN_POSITIVE, 10.0)?;
        check_range("motion.spring_damping", motion.spring_damping, f32::MIN_POSITIVE, 10.0)?;
        if motion.frame_interval_ms == Some(0) {
            return Err(invalid("motion.frame_interval_ms", "must be at least 1"));
        }
        Ok(())
    }

    /// Configuration with this policy's `[sheet]` values over the defaults.
    pub fn to_configuration(&self) -> Result<SheetConfiguration, PolicyError> {
        let sheet = &self.sheet;
        let defaults = SheetConfiguration::default();
        let mut config = defaults.clone();
        if let Some(ratio) = sheet.dismiss_ratio {
            config = config.dismiss_ratio(ratio);
        }
        if let Some(distance) = sheet.max_over_drag {
            config = config.max_over_drag(distance);
        }
        if let Some(allow) = sheet.allow_dismiss {
            config = config.allow_dismiss(allow);
        }
        if let Some(scrollable) = sheet.scrollable {
            config = config.scrollable(scrollable);
        }

        let color = parse_color("sheet.background", sheet.background.as_deref())?
            .unwrap_or(defaults.background.color);
        let radius = sheet.corner_radius.unwrap_or(defaults.background.corner_radius);
        config = config.background(SheetBackground::new(color, radius));

        let mut dim: DimStyle = defaults.dim;
        if let Some(color) = parse_color("sheet.dim_color", sheet.dim_color.as_deref())? {
            dim = dim.color(color);
        }
        if let Some(opacity) = sheet.dim_opacity {
            dim = dim.opacity(opacity);
        }
        config = config.dim(dim);

        if sheet.show_indicator == Some(false) {
            config = config.indicator(DragIndicator::hidden());
        }
        Ok(config)
    }

    /// Metrics with this policy's `[motion]` values over the defaults.
    #[must_use]
    pub fn to_metrics(&self) -> SheetMetrics {
        let motion = &self.motion;
        let mut metrics = SheetMetrics::default();
        if let Some(padding) = motion.bottom_padding {
            metrics = metrics.bottom_padding(padding);
        }
        if let Some(ratio) = motion.content_max_height_ratio {
            metrics = metrics.content_max_height_ratio(ratio);
        }
        if motion.spring_response.is_some() || motion.spring_damping.is_some() {
            metrics = metrics.spring(SpringCurve::new(
                motion.spring_response.unwrap_or(SpringCurve::INTERACTIVE.response),
                motion.spring_damping.unwrap_or(SpringCurve::INTERACTIVE.damping_fraction),
            ));
        }
        if let Some(delay) = motion.dismiss_delay_ms {
            metrics = metrics.dismiss_timing(DismissTiming::FixedDelay(Duration::from_millis(delay)));
        }
        if let Some(interval) = motion.frame_interval_ms {
            metrics = metrics.frame_interval(Duration::from_millis(interval));
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_policy_is_the_default() {
        let policy = SheetPolicy::from_toml_str("").expect("empty policy parses");
        assert_eq!(policy.to_configuration().ok(), Some(SheetConfiguration::default()));
        assert_eq!(policy.to_metrics(), SheetMetrics::default());
    }

    #[test]
    fn toml_overrides_defaults() {
        let policy = SheetPolicy::from_toml_str(
            r##"
            [sheet]
            dismiss_ratio = 0.25
            allow_dismiss = false
            background = "#F2F2F7"
            show_indicator = false

            [motion]
            dismiss_delay_ms = 150
            "##,
        )
        .expect("valid policy");
        let config = policy.to_configuration().expect("colors parse");
        assert_eq!(config.dismiss_ratio, 0.25);
        assert!(!config.allow_dismiss);
        assert_eq!(config.background.color, Rgba::rgb(0xF2, 0xF2, 0xF7));
        assert!(!config.indicator.visible);
        assert_eq!(
            policy.to_metrics().dismiss_timing,
            DismissTiming::FixedDelay(Duration::from_millis(150))
        );
    }

    #[test]
    fn json_matches_toml() {
        let json = SheetPolicy::from_json_str(r#"{"sheet":{"max_over_drag":20.0},"motion":{"bottom_padding":80.0}}"#)
            .expect("valid json");
        let toml = SheetPolicy::from_toml_str("[sheet]\nmax_over_drag = 20.0\n[motion]\nbottom_padding = 80.0\n")
            .expect("valid toml");
        assert_eq!(json, toml);
        assert_eq!(json.to_metrics().bottom_padding, 80.0);
    }

    #[test]
    fn out_of_range_values_name_the_field() {
        let err = SheetPolicy::from_toml_str("[sheet]\ndim_opacity = 1.5\n").expect_err("out of range");
        match err {
            PolicyError::Invalid { field, .. } => assert_eq!(field, "sheet.dim_opacity"),
            other => panic!("unexpected error: {other}"),
        }

        let err = SheetPolicy::from_json_str(r#"{"sheet":{"background":"blue"}}"#).expect_err("bad color");
        assert!(err.to_string().contains("sheet.background"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SheetPolicy::from_toml_str("[sheet]\ndismis_ratio = 0.3\n").expect_err("typo");
        assert!(matches!(err, PolicyError::Toml(_)));
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().expect("tempdir");

        let toml_path = dir.path().join("sheet.toml");
        let mut file = std::fs::File::create(&toml_path).expect("create");
        writeln!(file, "[sheet]\nscrollable = false").expect("write");
        let policy = SheetPolicy::load(&toml_path).expect("load toml");
        assert_eq!(policy.sheet.scrollable, Some(false));

        let json_path = dir.path().join("sheet.json");
        std::fs::write(&json_path, r#"{"motion":{"frame_interval_ms":8}}"#).expect("write");
        let policy = SheetPolicy::load(&json_path).expect("load json");
        assert_eq!(policy.to_metrics().frame_interval, Duration::from_millis(8));

        let yaml_path = dir.path().join("sheet.yaml");
        std::fs::write(&yaml_path, "sheet: {}").expect("write");
        assert!(matches!(
            SheetPolicy::load(&yaml_path),
            Err(PolicyError::Invalid { field: "path", .. })
        ));

        assert!(matches!(
            SheetPolicy::load(dir.path().join("missing.toml")),
            Err(PolicyError::Io(_))
        ));
    }
}
