#![forbid(unsafe_code)]

//! Detection configuration: thresholds, root margin, and the trigger-once flag.
//!
//! A [`DetectionConfig`] is handed to
//! [`VisibilityController::attach`](crate::VisibilityController::attach) and
//! stays fixed for the lifetime of the detection resource created from it.
//! Changing any field means tearing the resource down and creating a new one
//! (see [`VisibilityController::reconfigure`](crate::VisibilityController::reconfigure)).
//!
//! # Defaults
//!
//! | Field          | Default  |
//! |----------------|----------|
//! | `root_margin`  | `0`      |
//! | `thresholds`   | `[0.0]`  |
//! | `trigger_once` | `false`  |
//!
//! # Failure Modes
//!
//! Building a config never fails; only [`ObserverOptions::validate`],
//! [`RootMargin::parse`], and the `config-file` loaders return
//! [`ConfigError`]. The controller itself never validates: platforms treat
//! whatever options they are given as opaque.

use std::fmt;

/// Error type for configuration construction and loading.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A threshold was outside `[0.0, 1.0]`.
    ThresholdOutOfRange(f64),
    /// A threshold was NaN.
    ThresholdNotANumber,
    /// No thresholds were configured.
    EmptyThresholds,
    /// A root margin string could not be parsed.
    InvalidMargin(String),
    /// Config text could not be parsed (TOML or JSON).
    #[cfg(feature = "config-file")]
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdOutOfRange(t) => {
                write!(f, "threshold {t} is outside the range 0.0..=1.0")
            }
            Self::ThresholdNotANumber => write!(f, "threshold is not a number"),
            Self::EmptyThresholds => write!(f, "at least one threshold is required"),
            Self::InvalidMargin(raw) => write!(f, "invalid root margin: {raw:?}"),
            #[cfg(feature = "config-file")]
            Self::Parse(msg) => write!(f, "failed to parse detection config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Growth (positive) or shrinkage (negative) applied to each edge of the
/// viewing region before intersections are computed.
///
/// Units are whatever the platform measures bounds in (cells for a terminal
/// viewport, CSS pixels for a browser).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config-file", derive(serde::Serialize, serde::Deserialize))]
pub struct RootMargin {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl RootMargin {
    /// The same margin on all four edges.
    #[must_use]
    pub const fn uniform(value: i32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Vertical (top/bottom) and horizontal (left/right) margins.
    #[must_use]
    pub const fn symmetric(vertical: i32, horizontal: i32) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    /// Parse CSS-style margin shorthand.
    ///
    /// Accepts one to four whitespace-separated integers, each with an
    /// optional `px` suffix, expanded the way CSS expands `margin`:
    ///
    /// - `"10"` → all edges
    /// - `"10 20"` → vertical, horizontal
    /// - `"10 20 30"` → top, horizontal, bottom
    /// - `"10 20 30 40"` → top, right, bottom, left
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidMargin`] for empty input, more than four values,
    /// or a value that is not an integer.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidMargin(raw.to_string());
        let mut values = [0i32; 4];
        let mut count = 0;
        for token in raw.split_whitespace() {
            if count == values.len() {
                return Err(invalid());
            }
            let digits = token.strip_suffix("px").unwrap_or(token);
            values[count] = digits.parse().map_err(|_| invalid())?;
            count += 1;
        }
        let [a, b, c, d] = values;
        match count {
            1 => Ok(Self::uniform(a)),
            2 => Ok(Self::symmetric(a, b)),
            3 => Ok(Self {
                top: a,
                right: b,
                bottom: c,
                left: b,
            }),
            4 => Ok(Self {
                top: a,
                right: b,
                bottom: c,
                left: d,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}px {}px {}px {}px",
            self.top, self.right, self.bottom, self.left
        )
    }
}

/// Platform-facing options for a detection resource.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-file", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct ObserverOptions {
    /// Margin applied to the viewing region.
    pub root_margin: RootMargin,
    /// Intersection ratios at which visibility changes are reported.
    pub thresholds: Vec<f64>,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            root_margin: RootMargin::default(),
            thresholds: vec![0.0],
        }
    }
}

impl ObserverOptions {
    /// Create options with the default margin and threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root margin.
    #[must_use]
    pub fn root_margin(mut self, margin: RootMargin) -> Self {
        self.root_margin = margin;
        self
    }

    /// Use a single threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.thresholds = vec![threshold];
        self
    }

    /// Use several thresholds. Order and duplicates do not matter; see
    /// [`normalized`](Self::normalized).
    #[must_use]
    pub fn thresholds(mut self, thresholds: impl IntoIterator<Item = f64>) -> Self {
        self.thresholds = thresholds.into_iter().collect();
        self
    }

    /// Check every threshold lies in `[0.0, 1.0]` and at least one is set.
    ///
    /// # Errors
    ///
    /// Returns the first offending threshold as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.is_empty() {
            return Err(ConfigError::EmptyThresholds);
        }
        for &t in &self.thresholds {
            if t.is_nan() {
                return Err(ConfigError::ThresholdNotANumber);
            }
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::ThresholdOutOfRange(t));
            }
        }
        Ok(())
    }

    /// Validate, then sort ascending and drop duplicate thresholds.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        self.thresholds.sort_by(f64::total_cmp);
        self.thresholds.dedup();
        Ok(self)
    }

    /// The lowest configured threshold (`0.0` when none are set).
    #[must_use]
    pub fn min_threshold(&self) -> f64 {
        self.thresholds
            .iter()
            .copied()
            .filter(|t| !t.is_nan())
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}

/// Full configuration for one observation: platform options plus the
/// trigger-once flag.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "config-file", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct DetectionConfig {
    /// Options passed through to the platform.
    pub options: ObserverOptions,
    /// Stop watching the element after the first positive detection.
    pub trigger_once: bool,
}

impl DetectionConfig {
    /// Default configuration: watch continuously, threshold `0.0`, no margin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options with `trigger_once` enabled.
    #[must_use]
    pub fn once() -> Self {
        Self::default().trigger_once(true)
    }

    /// Set the trigger-once flag.
    #[must_use]
    pub fn trigger_once(mut self, trigger_once: bool) -> Self {
        self.trigger_once = trigger_once;
        self
    }

    /// Replace the platform options.
    #[must_use]
    pub fn options(mut self, options: ObserverOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the platform options.
    ///
    /// # Errors
    ///
    /// See [`ObserverOptions::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()
    }

    /// Parse and validate a config from TOML text.
    ///
    /// ```toml
    /// trigger_once = true
    ///
    /// [options]
    /// thresholds = [0.0, 0.5]
    /// root_margin = { top = 2, right = 0, bottom = 2, left = 0 }
    /// ```
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, or any validation error.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let options = config.options.normalized()?;
        Ok(Self { options, ..config })
    }

    /// Parse and validate a config from JSON text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed JSON, or any validation error.
    #[cfg(feature = "config-file")]
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let options = config.options.normalized()?;
        Ok(Self { options, ..config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = DetectionConfig::default();
        assert!(!cfg.trigger_once);
        assert_eq!(cfg.options.thresholds, vec![0.0]);
        assert_eq!(cfg.options.root_margin, RootMargin::uniform(0));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn once_sets_flag() {
        assert!(DetectionConfig::once().trigger_once);
    }

    #[test]
    fn margin_parse_one_value() {
        assert_eq!(RootMargin::parse("8px").unwrap(), RootMargin::uniform(8));
    }

    #[test]
    fn margin_parse_two_values() {
        assert_eq!(
            RootMargin::parse("4 -2").unwrap(),
            RootMargin::symmetric(4, -2)
        );
    }

    #[test]
    fn margin_parse_three_values() {
        let m = RootMargin::parse("1px 2px 3px").unwrap();
        assert_eq!((m.top, m.right, m.bottom, m.left), (1, 2, 3, 2));
    }

    #[test]
    fn margin_parse_four_values() {
        let m = RootMargin::parse("1 2 3 4").unwrap();
        assert_eq!((m.top, m.right, m.bottom, m.left), (1, 2, 3, 4));
    }

    #[test]
    fn margin_parse_rejects_garbage() {
        assert!(matches!(
            RootMargin::parse(""),
            Err(ConfigError::InvalidMargin(_))
        ));
        assert!(RootMargin::parse("1 2 3 4 5").is_err());
        assert!(RootMargin::parse("10%").is_err());
        assert!(RootMargin::parse("px").is_err());
    }

    #[test]
    fn margin_display_round_trips_through_parse() {
        let m = RootMargin {
            top: 1,
            right: -2,
            bottom: 3,
            left: 0,
        };
        assert_eq!(m.to_string(), "1px -2px 3px 0px");
        assert_eq!(RootMargin::parse(&m.to_string()).unwrap(), m);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let opts = ObserverOptions::new().thresholds([0.0, 1.5]);
        assert_eq!(opts.validate(), Err(ConfigError::ThresholdOutOfRange(1.5)));
        let opts = ObserverOptions::new().threshold(-0.1);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_and_empty() {
        let opts = ObserverOptions::new().threshold(f64::NAN);
        assert_eq!(opts.validate(), Err(ConfigError::ThresholdNotANumber));
        let opts = ObserverOptions::new().thresholds([]);
        assert_eq!(opts.validate(), Err(ConfigError::EmptyThresholds));
    }

    #[test]
    fn normalized_sorts_and_dedups() {
        let opts = ObserverOptions::new()
            .thresholds([1.0, 0.5, 0.0, 0.5])
            .normalized()
            .unwrap();
        assert_eq!(opts.thresholds, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn min_threshold() {
        let opts = ObserverOptions::new().thresholds([0.75, 0.25]);
        assert_eq!(opts.min_threshold(), 0.25);
        assert_eq!(ObserverOptions::new().thresholds([]).min_threshold(), 0.0);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ConfigError::ThresholdOutOfRange(2.0).to_string(),
            "threshold 2 is outside the range 0.0..=1.0"
        );
        assert_eq!(
            ConfigError::InvalidMargin("x".into()).to_string(),
            "invalid root margin: \"x\""
        );
        assert_eq!(
            ConfigError::EmptyThresholds.to_string(),
            "at least one threshold is required"
        );
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn from_toml_normalizes() {
        let cfg = DetectionConfig::from_toml_str(
            r#"
            trigger_once = true

            [options]
            thresholds = [1.0, 0.0]
            root_margin = { top = 2, right = 0, bottom = 2, left = 0 }
            "#,
        )
        .unwrap();
        assert!(cfg.trigger_once);
        assert_eq!(cfg.options.thresholds, vec![0.0, 1.0]);
        assert_eq!(cfg.options.root_margin, RootMargin::symmetric(2, 0));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn from_toml_missing_fields_use_defaults() {
        let cfg = DetectionConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, DetectionConfig::default());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn from_json_rejects_bad_threshold() {
        let err = DetectionConfig::from_json_str(r#"{"options":{"thresholds":[2.0]}}"#)
            .unwrap_err();
        assert_eq!(err, ConfigError::ThresholdOutOfRange(2.0));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn from_json_reports_parse_errors() {
        let err = DetectionConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
