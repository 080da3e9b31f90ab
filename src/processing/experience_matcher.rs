//! Years-of-experience fit against a job's declared range

use crate::processing::document::ExperienceRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Years short of the minimum at which the fit reaches zero
const UNDER_QUALIFIED_WINDOW: f32 = 5.0;
/// Years over the maximum at which the fit reaches its floor
const OVER_QUALIFIED_WINDOW: f32 = 10.0;
/// Over-qualification never drops the fit below this
const OVER_QUALIFIED_FLOOR: f32 = 0.5;
/// Largest score outside the range; 1.0 is reserved for a perfect fit
const BELOW_PERFECT: f32 = 1.0 - f32::EPSILON / 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitCategory {
    PerfectFit,
    UnderQualified,
    OverQualified,
}

impl fmt::Display for FitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FitCategory::PerfectFit => "Perfect Fit",
            FitCategory::UnderQualified => "Under-Qualified",
            FitCategory::OverQualified => "Over-Qualified",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceFitResult {
    pub fit_score: f32,
    pub fit_category: FitCategory,
    pub candidate_years: f32,
    pub required_min: f32,
    pub required_max: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ExperienceMatcher;

impl ExperienceMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn fit(&self, candidate_years: f32, min_years: f32, max_years: f32) -> ExperienceFitResult {
        let (fit_score, fit_category) = if min_years <= candidate_years && candidate_years <= max_years {
            (1.0, FitCategory::PerfectFit)
        } else if candidate_years < min_years {
            let gap = min_years - candidate_years;
            (
                (1.0 - gap / UNDER_QUALIFIED_WINDOW).clamp(0.0, BELOW_PERFECT),
                FitCategory::UnderQualified,
            )
        } else {
            let excess = candidate_years - max_years;
            (
                (1.0 - excess / OVER_QUALIFIED_WINDOW).clamp(OVER_QUALIFIED_FLOOR, BELOW_PERFECT),
                FitCategory::OverQualified,
            )
        };

        ExperienceFitResult {
            fit_score,
            fit_category,
            candidate_years,
            required_min: min_years,
            required_max: max_years,
        }
    }

    pub fn fit_range(&self, candidate_years: f32, range: &ExperienceRange) -> ExperienceFitResult {
        self.fit(candidate_years, range.min(), range.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_range_is_perfect() {
        let result = ExperienceMatcher::new().fit(6.0, 5.0, 10.0);
        assert_eq!(result.fit_category, FitCategory::PerfectFit);
        assert_eq!(result.fit_score, 1.0);

        let edge = ExperienceMatcher::new().fit(5.0, 5.0, 5.0);
        assert_eq!(edge.fit_score, 1.0);
    }

    #[test]
    fn test_under_qualified_scenario() {
        let result = ExperienceMatcher::new().fit(2.0, 5.0, 10.0);
        assert_eq!(result.fit_category, FitCategory::UnderQualified);
        assert!((result.fit_score - 0.4).abs() < 1e-6);
        assert_eq!(result.fit_category.to_string(), "Under-Qualified");
    }

    #[test]
    fn test_under_qualified_bottoms_out_at_zero() {
        let result = ExperienceMatcher::new().fit(0.0, 7.0, 10.0);
        assert_eq!(result.fit_score, 0.0);
    }

    #[test]
    fn test_over_qualified_scenario() {
        let result = ExperienceMatcher::new().fit(12.0, 3.0, 8.0);
        assert_eq!(result.fit_category, FitCategory::OverQualified);
        assert!((result.fit_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_over_qualified_floor() {
        let result = ExperienceMatcher::new().fit(40.0, 1.0, 3.0);
        assert_eq!(result.fit_score, 0.5);
    }

    #[test]
    fn test_score_is_one_only_inside_range() {
        let matcher = ExperienceMatcher::new();
        for tenths in 0..200 {
            let years = tenths as f32 / 10.0;
            let result = matcher.fit(years, 4.0, 9.0);
            assert!((0.0..=1.0).contains(&result.fit_score));
            let inside = (4.0..=9.0).contains(&years);
            assert_eq!(result.fit_score == 1.0, inside, "years = {}", years);
        }
    }

    #[test]
    fn test_tiny_gaps_never_round_to_perfect() {
        let matcher = ExperienceMatcher::new();

        let over = matcher.fit(1e-9, 0.0, 0.0);
        assert_eq!(over.fit_category, FitCategory::OverQualified);
        assert!(over.fit_score < 1.0);

        let under = matcher.fit(0.0, 1e-9, 2.0);
        assert_eq!(under.fit_category, FitCategory::UnderQualified);
        assert!(under.fit_score < 1.0);
    }
}
