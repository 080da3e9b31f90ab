//! Weighted fusion of the per-job signals into a 0-100 score

use crate::config::{RankingConfig, ScoringConfig};
use serde::{Deserialize, Serialize};

/// Points contributed by each signal; `total` is their clamped sum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic_points: f32,
    pub skill_points: f32,
    pub experience_points: f32,
    /// Present only once an analysis score has been blended in
    pub analysis_points: Option<f32>,
    /// True when `experience_points` came from the placeholder fit
    pub experience_placeholder: bool,
    pub total: f32,
}

#[derive(Debug, Clone)]
pub struct ScoreFusion {
    semantic_weight: f32,
    skill_weight: f32,
    experience_weight: f32,
    llm_weight: f32,
    experience_placeholder: f32,
}

impl ScoreFusion {
    pub fn new(weights: &ScoringConfig, experience_placeholder: f32) -> Self {
        Self {
            semantic_weight: weights.semantic_weight,
            skill_weight: weights.skill_weight,
            experience_weight: weights.experience_weight,
            llm_weight: weights.llm_weight,
            experience_placeholder: experience_placeholder.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(scoring: &ScoringConfig, ranking: &RankingConfig) -> Self {
        Self::new(scoring, ranking.experience_placeholder)
    }

    /// `experience_fit` is `None` when either side of the comparison is
    /// unknown; the placeholder fit is scored in its place.
    pub fn fuse(&self, semantic: f32, coverage: f32, experience_fit: Option<f32>) -> ScoreBreakdown {
        let semantic_points = unit(semantic) * self.semantic_weight * 100.0;
        let skill_points = unit(coverage) * self.skill_weight * 100.0;
        let experience_placeholder = experience_fit.is_none();
        let fit = unit(experience_fit.unwrap_or(self.experience_placeholder));
        let experience_points = fit * self.experience_weight * 100.0;

        let mut breakdown = ScoreBreakdown {
            semantic_points,
            skill_points,
            experience_points,
            analysis_points: None,
            experience_placeholder,
            total: 0.0,
        };
        breakdown.total = clamp_total(semantic_points + skill_points + experience_points);
        breakdown
    }

    /// Add a 0-100 analysis score weighted by the LLM weight
    pub fn blend(&self, breakdown: &ScoreBreakdown, analysis_score: f32) -> ScoreBreakdown {
        let analysis_points = unit(analysis_score / 100.0) * 100.0 * self.llm_weight;
        let mut blended = *breakdown;
        blended.analysis_points = Some(analysis_points);
        blended.total = clamp_total(
            breakdown.semantic_points + breakdown.skill_points + breakdown.experience_points + analysis_points,
        );
        blended
    }
}

/// Clamp a signal to [0, 1], treating NaN as 0
fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn clamp_total(total: f32) -> f32 {
    if total.is_finite() {
        total.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> ScoreFusion {
        ScoreFusion::new(&crate::config::Config::default().scoring, 0.5)
    }

    #[test]
    fn test_weighted_sum() {
        let score = fusion().fuse(0.8, 2.0 / 3.0, Some(1.0));
        assert!((score.semantic_points - 28.0).abs() < 1e-4);
        assert!((score.skill_points - 20.0).abs() < 1e-4);
        assert!((score.experience_points - 15.0).abs() < 1e-4);
        assert!((score.total - 63.0).abs() < 1e-4);
        assert!(!score.experience_placeholder);
    }

    #[test]
    fn test_unknown_experience_uses_placeholder() {
        let score = fusion().fuse(0.0, 0.0, None);
        assert!(score.experience_placeholder);
        assert!((score.experience_points - 7.5).abs() < 1e-4);
    }

    #[test]
    fn test_blend_adds_weighted_analysis_score() {
        let fusion = fusion();
        let base = fusion.fuse(1.0, 1.0, Some(1.0));
        let blended = fusion.blend(&base, 90.0);
        assert!((blended.analysis_points.unwrap() - 18.0).abs() < 1e-4);
        assert!((blended.total - 98.0).abs() < 1e-4);
    }

    #[test]
    fn test_total_is_bounded() {
        let heavy = ScoringConfig {
            semantic_weight: 1.0,
            skill_weight: 1.0,
            experience_weight: 1.0,
            llm_weight: 1.0,
        };
        let fusion = ScoreFusion::new(&heavy, 0.5);
        assert_eq!(fusion.fuse(1.0, 1.0, Some(1.0)).total, 100.0);
        assert_eq!(fusion.fuse(f32::NAN, 0.0, None).total, 50.0);
    }
}
