// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration. Every recognised option is enumerated here with its
// default; `OmrConfig::validate` runs before any sheet is touched.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{OmrError, Result};

/// Complete engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    pub preprocess: PreprocessConfig,
    pub grid: GridConfig,
    pub marks: MarkConfig,
    pub confidence: ConfidenceConfig,
    pub scoring: ScoringConfig,
    pub batch: BatchConfig,
    pub report: ReportConfig,
}

impl OmrConfig {
    /// Parse configuration from JSON text and validate it.
    ///
    /// Missing keys fall back to their defaults, so `{}` is a valid document.
    #[instrument(skip(json), fields(json_len = json.len()))]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| OmrError::Config(format!("malformed configuration: {err}")))?;
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Check every option against its legal range.
    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        self.grid.validate()?;
        self.marks.validate()?;
        self.confidence.validate()?;
        self.batch.validate()?;
        self.report.validate()?;
        Ok(())
    }
}

// -- Preprocessing ------------------------------------------------------------

/// Image normalisation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gaussian smoothing kernel size in pixels (odd). 1 disables smoothing.
    pub blur_kernel_size: u32,
    /// Side of the square window used for the local threshold (odd, >= 3).
    pub threshold_block_size: u32,
    /// How far below the local mean a pixel must be to count as ink.
    pub threshold_c: i32,
    /// Radius of the morphological closing applied to the ink mask. 0 disables it.
    pub closing_radius: u8,
    /// Smallest accepted input width in pixels.
    pub min_width: u32,
    /// Smallest accepted input height in pixels.
    pub min_height: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            threshold_block_size: 41,
            threshold_c: 10,
            closing_radius: 1,
            min_width: 64,
            min_height: 64,
        }
    }
}

impl PreprocessConfig {
    fn validate(&self) -> Result<()> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(OmrError::Config(format!(
                "blur_kernel_size must be a positive odd number, got {}",
                self.blur_kernel_size
            )));
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(OmrError::Config(format!(
                "threshold_block_size must be an odd number >= 3, got {}",
                self.threshold_block_size
            )));
        }
        if !(-255..=255).contains(&self.threshold_c) {
            return Err(OmrError::Config(format!(
                "threshold_c must lie in -255..=255, got {}",
                self.threshold_c
            )));
        }
        if self.min_width == 0 || self.min_height == 0 {
            return Err(OmrError::Config(
                "min_width and min_height must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Radius of the thresholding window.
    pub fn threshold_radius(&self) -> u32 {
        self.threshold_block_size / 2
    }
}

// -- Grid ---------------------------------------------------------------------

/// How strictly the outer sheet boundary must be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// No boundary → `GridDetection` error.
    Required,
    /// No boundary → treat the whole image as the sheet.
    Optional,
    /// The input is already cropped and rectified.
    Skip,
}

/// Grid resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub boundary: BoundaryMode,
    /// Minimum share of the image area the boundary quadrilateral must cover.
    pub min_boundary_fraction: f64,
    pub strategy: GridStrategyConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            boundary: BoundaryMode::Required,
            min_boundary_fraction: 0.25,
            strategy: GridStrategyConfig::Layout(LayoutConfig::default()),
        }
    }
}

impl GridConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_boundary_fraction > 0.0 && self.min_boundary_fraction <= 1.0) {
            return Err(OmrError::Config(format!(
                "min_boundary_fraction must lie in (0, 1], got {}",
                self.min_boundary_fraction
            )));
        }
        match &self.strategy {
            GridStrategyConfig::Layout(layout) => layout.validate(),
            GridStrategyConfig::Contours(contours) => contours.validate(),
        }
    }
}

/// Which bubble-resolution strategy to run inside the rectified sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridStrategyConfig {
    /// Fixed geometry from rows, columns, and margins.
    Layout(LayoutConfig),
    /// Detect round shapes and cluster them into rows.
    Contours(ContourConfig),
}

/// Fixed sheet layout. All lengths are fractions of the rectified sheet.
///
/// Questions fill `blocks` side-by-side columns top to bottom; each block row
/// holds a label strip followed by one cell per option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub blocks: u32,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    /// Horizontal gap between blocks.
    pub block_gap: f64,
    /// Share of each block's width reserved for question labels.
    pub label_fraction: f64,
    /// Bubble diameter as a share of the smaller cell side.
    pub bubble_fraction: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            blocks: 1,
            margin_top: 0.08,
            margin_bottom: 0.05,
            margin_left: 0.06,
            margin_right: 0.06,
            block_gap: 0.04,
            label_fraction: 0.2,
            bubble_fraction: 0.6,
        }
    }
}

impl LayoutConfig {
    fn validate(&self) -> Result<()> {
        if self.blocks == 0 {
            return Err(OmrError::Config("layout.blocks must be at least 1".into()));
        }
        let fractions = [
            ("margin_top", self.margin_top),
            ("margin_bottom", self.margin_bottom),
            ("margin_left", self.margin_left),
            ("margin_right", self.margin_right),
            ("block_gap", self.block_gap),
            ("label_fraction", self.label_fraction),
        ];
        for (name, value) in fractions {
            if !(0.0..1.0).contains(&value) {
                return Err(OmrError::Config(format!(
                    "layout.{name} must lie in [0, 1), got {value}"
                )));
            }
        }
        if self.margin_top + self.margin_bottom >= 1.0 || self.margin_left + self.margin_right >= 1.0
        {
            return Err(OmrError::Config("layout margins leave no room for bubbles".into()));
        }
        if !(self.bubble_fraction > 0.0 && self.bubble_fraction <= 1.0) {
            return Err(OmrError::Config(format!(
                "layout.bubble_fraction must lie in (0, 1], got {}",
                self.bubble_fraction
            )));
        }
        Ok(())
    }
}

/// Shape-detection settings for the contour strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Smallest bounding-box area (px²) accepted as a bubble.
    pub min_bubble_area: u32,
    /// Largest bounding-box area (px²) accepted as a bubble.
    pub max_bubble_area: u32,
    /// Row clustering tolerance as a multiple of the median bubble height.
    pub row_tolerance: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_bubble_area: 50,
            max_bubble_area: 2500,
            row_tolerance: 0.5,
        }
    }
}

impl ContourConfig {
    fn validate(&self) -> Result<()> {
        if self.min_bubble_area == 0 || self.min_bubble_area >= self.max_bubble_area {
            return Err(OmrError::Config(format!(
                "contour bubble area range {}..{} is empty",
                self.min_bubble_area, self.max_bubble_area
            )));
        }
        if !(self.row_tolerance > 0.0) {
            return Err(OmrError::Config(format!(
                "row_tolerance must be positive, got {}",
                self.row_tolerance
            )));
        }
        Ok(())
    }
}

// -- Marks / confidence / scoring ---------------------------------------------

/// Mark classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkConfig {
    /// Fill ratio above which a bubble counts as marked.
    pub fill_threshold: f64,
    /// Minimum lead of the top fill ratio over the runner-up.
    pub separation_margin: f64,
    /// Share of each bubble side trimmed before sampling, to skip the printed outline.
    pub sample_inset: f64,
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            fill_threshold: 0.5,
            separation_margin: 0.15,
            sample_inset: 0.15,
        }
    }
}

impl MarkConfig {
    fn validate(&self) -> Result<()> {
        if !(self.fill_threshold > 0.0 && self.fill_threshold < 1.0) {
            return Err(OmrError::Config(format!(
                "fill_threshold must lie in (0, 1), got {}",
                self.fill_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.separation_margin) {
            return Err(OmrError::Config(format!(
                "separation_margin must lie in [0, 1], got {}",
                self.separation_margin
            )));
        }
        if !(0.0..0.5).contains(&self.sample_inset) {
            return Err(OmrError::Config(format!(
                "sample_inset must lie in [0, 0.5), got {}",
                self.sample_inset
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Questions below this confidence are flagged `low_confidence`.
    pub confidence_floor: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
        }
    }
}

impl ConfidenceConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(OmrError::Config(format!(
                "confidence_floor must lie in [0, 1], got {}",
                self.confidence_floor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Accept any letter listed in the key's `accepted_answers`.
    pub allow_alternate_answers: bool,
}

// -- Batch / report -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum sheets processed at once.
    pub concurrency_limit: usize,
    /// Abort the batch after this many failures in a row. `None` never aborts.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            max_consecutive_failures: Some(10),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(OmrError::Config("concurrency_limit must be at least 1".into()));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(OmrError::Config(
                "max_consecutive_failures must be at least 1 (or null to disable)".into(),
            ));
        }
        Ok(())
    }
}

/// One histogram bucket: scores `>= min_score` not claimed by a higher bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub label: String,
    pub min_score: f64,
}

impl ScoreBucket {
    pub fn new(label: impl Into<String>, min_score: f64) -> Self {
        Self {
            label: label.into(),
            min_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub score_buckets: Vec<ScoreBucket>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            score_buckets: vec![
                ScoreBucket::new("90-100", 90.0),
                ScoreBucket::new("80-89", 80.0),
                ScoreBucket::new("70-79", 70.0),
                ScoreBucket::new("60-69", 60.0),
                ScoreBucket::new("0-59", 0.0),
            ],
        }
    }
}

impl ReportConfig {
    fn validate(&self) -> Result<()> {
        if self.score_buckets.is_empty() {
            return Err(OmrError::Config("score_buckets must not be empty".into()));
        }
        if !self.score_buckets.iter().any(|b| b.min_score <= 0.0) {
            return Err(OmrError::Config(
                "score_buckets must include a bucket starting at 0".into(),
            ));
        }
        for (i, bucket) in self.score_buckets.iter().enumerate() {
            if !bucket.min_score.is_finite() {
                return Err(OmrError::Config(format!(
                    "bucket {:?} has a non-finite min_score",
                    bucket.label
                )));
            }
            if self.score_buckets[..i].iter().any(|b| b.label == bucket.label) {
                return Err(OmrError::Config(format!(
                    "duplicate score bucket label {:?}",
                    bucket.label
                )));
            }
        }
        Ok(())
    }

    /// Label of the bucket a score falls into: the highest `min_score` not above it.
    pub fn bucket_for(&self, score: f64) -> Option<&str> {
        self.score_buckets
            .iter()
            .filter(|b| score >= b.min_score)
            .max_by(|a, b| a.min_score.total_cmp(&b.min_score))
            .map(|b| b.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = OmrConfig::from_json("{}").unwrap();
        assert_eq!(config, OmrConfig::default());
        assert_eq!(config.marks.fill_threshold, 0.5);
        assert_eq!(config.marks.separation_margin, 0.15);
        assert_eq!(config.confidence.confidence_floor, 0.5);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            OmrConfig::from_json(r#"{"marks": {"fill_threshold": 0.4}, "batch": {"concurrency_limit": 2}}"#)
                .unwrap();
        assert_eq!(config.marks.fill_threshold, 0.4);
        assert_eq!(config.marks.separation_margin, 0.15);
        assert_eq!(config.batch.concurrency_limit, 2);
        assert_eq!(config.batch.max_consecutive_failures, Some(10));
    }

    #[test]
    fn even_kernel_is_rejected() {
        let err = OmrConfig::from_json(r#"{"preprocess": {"blur_kernel_size": 4}}"#).unwrap_err();
        assert!(matches!(err, OmrError::Config(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = OmrConfig::from_json(r#"{"batch": {"concurrency_limit": 0}}"#).unwrap_err();
        assert!(matches!(err, OmrError::Config(_)));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = OmrConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, OmrError::Config(_)));
    }

    #[test]
    fn contour_strategy_parses() {
        let config = OmrConfig::from_json(
            r#"{"grid": {"boundary": "optional", "strategy": {"kind": "contours", "row_tolerance": 0.8}}}"#,
        )
        .unwrap();
        assert_eq!(config.grid.boundary, BoundaryMode::Optional);
        match config.grid.strategy {
            GridStrategyConfig::Contours(c) => {
                assert_eq!(c.row_tolerance, 0.8);
                assert_eq!(c.min_bubble_area, 50);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn default_buckets() {
        let report = ReportConfig::default();
        assert_eq!(report.bucket_for(100.0), Some("90-100"));
        assert_eq!(report.bucket_for(90.0), Some("90-100"));
        assert_eq!(report.bucket_for(89.99), Some("80-89"));
        assert_eq!(report.bucket_for(75.0), Some("70-79"));
        assert_eq!(report.bucket_for(0.0), Some("0-59"));
    }

    #[test]
    fn buckets_without_zero_floor_are_rejected() {
        let err = OmrConfig::from_json(
            r#"{"report": {"score_buckets": [{"label": "pass", "min_score": 50.0}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, OmrError::Config(_)));
    }
}
