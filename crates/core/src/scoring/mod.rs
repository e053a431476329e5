//! Additive scoring with clamp and five-bucket classification.
//!
//! A score starts at a base (50), each metric contributes the delta of the
//! first band it matches, and the sum is clamped to [0, 100]. Bands within a
//! metric are listed most-extreme first, so at most one fires per metric.
//! Signal sources differ only in their contribution tables and stage labels.

use crate::domain::signal::Stage;

pub const BASE_SCORE: f64 = 50.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Inclusive lower bounds of the first four buckets; anything below the last
/// falls into the fifth.
pub const STAGE_BREAKPOINTS: [f64; 4] = [70.0, 55.0, 45.0, 30.0];

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

pub fn stage_for(score: f64) -> Stage {
    STAGE_BREAKPOINTS
        .iter()
        .position(|bp| score >= *bp)
        .map(|i| Stage::ALL[i])
        .unwrap_or(Stage::StrongNegative)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Above(f64),
    Below(f64),
}

impl Condition {
    /// Strict comparison; NaN never matches.
    pub fn matches(self, value: f64) -> bool {
        match self {
            Self::Above(t) => value > t,
            Self::Below(t) => value < t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub when: Condition,
    pub delta: f64,
}

/// Bands for one metric of `M`, evaluated in order.
pub struct MetricRule<M> {
    pub name: &'static str,
    extract: fn(&M) -> f64,
    bands: Vec<Band>,
}

impl<M> MetricRule<M> {
    pub fn new(name: &'static str, extract: fn(&M) -> f64) -> Self {
        Self {
            name,
            extract,
            bands: Vec::new(),
        }
    }

    pub fn above(mut self, threshold: f64, delta: f64) -> Self {
        self.bands.push(Band {
            when: Condition::Above(threshold),
            delta,
        });
        self
    }

    pub fn below(mut self, threshold: f64, delta: f64) -> Self {
        self.bands.push(Band {
            when: Condition::Below(threshold),
            delta,
        });
        self
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Delta of the first matching band, 0 when none match.
    pub fn contribution(&self, metrics: &M) -> f64 {
        let value = (self.extract)(metrics);
        self.bands
            .iter()
            .find(|b| b.when.matches(value))
            .map(|b| b.delta)
            .unwrap_or(0.0)
    }
}

/// Display text for each stage, strongest-positive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLabels(pub [&'static str; 5]);

impl StageLabels {
    pub fn label(&self, stage: Stage) -> &'static str {
        self.0[stage.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub score: f64,
    pub stage: Stage,
    pub label: &'static str,
    pub contributions: Vec<(&'static str, f64)>,
}

pub struct ScoreEngine<M> {
    base: f64,
    rules: Vec<MetricRule<M>>,
    labels: StageLabels,
}

impl<M> ScoreEngine<M> {
    pub fn new(labels: StageLabels) -> Self {
        Self {
            base: BASE_SCORE,
            rules: Vec::new(),
            labels,
        }
    }

    pub fn rule(mut self, rule: MetricRule<M>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn labels(&self) -> StageLabels {
        self.labels
    }

    pub fn rules(&self) -> &[MetricRule<M>] {
        &self.rules
    }

    pub fn score(&self, metrics: &M) -> Scored {
        let contributions: Vec<(&'static str, f64)> = self
            .rules
            .iter()
            .map(|r| (r.name, r.contribution(metrics)))
            .collect();
        let raw = self.base + contributions.iter().map(|(_, d)| d).sum::<f64>();
        let score = clamp_score(raw);
        let stage = stage_for(score);
        Scored {
            score,
            stage,
            label: self.labels.label(stage),
            contributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: StageLabels = StageLabels(["A", "B", "C", "D", "E"]);

    fn pct_rule() -> MetricRule<f64> {
        MetricRule::new("pct", |v: &f64| *v)
            .above(10.0, 15.0)
            .above(5.0, 10.0)
            .below(-10.0, -15.0)
            .below(-5.0, -10.0)
    }

    #[test]
    fn first_matching_band_wins() {
        let rule = pct_rule();
        assert_eq!(rule.contribution(&12.0), 15.0);
        assert_eq!(rule.contribution(&7.0), 10.0);
        assert_eq!(rule.contribution(&5.0), 0.0);
        assert_eq!(rule.contribution(&-7.0), -10.0);
        assert_eq!(rule.contribution(&-12.0), -15.0);
        assert_eq!(rule.contribution(&f64::NAN), 0.0);
    }

    #[test]
    fn bucket_boundaries_are_inclusive_lower_bounds() {
        let cases = [
            (0.0, Stage::StrongNegative),
            (29.0, Stage::StrongNegative),
            (30.0, Stage::Negative),
            (44.0, Stage::Negative),
            (45.0, Stage::Neutral),
            (54.0, Stage::Neutral),
            (55.0, Stage::Positive),
            (69.0, Stage::Positive),
            (70.0, Stage::StrongPositive),
            (100.0, Stage::StrongPositive),
        ];
        for (score, expected) in cases {
            assert_eq!(stage_for(score), expected, "score={score}");
        }

        // Desirability never increases as the score falls.
        let stages: Vec<Stage> = cases.iter().rev().map(|(s, _)| stage_for(*s)).collect();
        assert!(stages.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn score_clamps_and_labels() {
        let engine = ScoreEngine::new(LABELS)
            .rule(MetricRule::new("a", |v: &f64| *v).above(0.0, 40.0))
            .rule(MetricRule::new("b", |v: &f64| *v).above(0.0, 40.0));
        let s = engine.score(&1.0);
        assert_eq!(s.score, 100.0);
        assert_eq!(s.stage, Stage::StrongPositive);
        assert_eq!(s.label, "A");
        assert_eq!(s.contributions, vec![("a", 40.0), ("b", 40.0)]);

        let neutral = engine.score(&-1.0);
        assert_eq!(neutral.score, 50.0);
        assert_eq!(neutral.label, "C");
    }
}
