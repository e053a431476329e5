//! Keyword classification of summary text into a recommendation and bonus.

use crate::domain::recommendation::Recommendation;

/// One keyword family. English and Korean keywords are parallel lists;
/// a match in either language fires the rule.
#[derive(Debug, Clone, Copy)]
pub struct SentimentRule {
    pub english: &'static [&'static str],
    pub korean: &'static [&'static str],
    pub bonus: f64,
    pub recommendation: Recommendation,
}

impl SentimentRule {
    /// Case-sensitive substring match.
    pub fn matches(&self, text: &str) -> bool {
        self.english
            .iter()
            .chain(self.korean)
            .any(|kw| text.contains(kw))
    }
}

/// Evaluated in order; the first matching family wins.
pub const SENTIMENT_RULES: [SentimentRule; 2] = [
    SentimentRule {
        english: &["Strong"],
        korean: &["적극"],
        bonus: 20.0,
        recommendation: Recommendation::StrongBuy,
    },
    SentimentRule {
        english: &["Buy"],
        korean: &["매수"],
        bonus: 10.0,
        recommendation: Recommendation::Buy,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub bonus: f64,
    pub recommendation: Recommendation,
}

impl Classification {
    pub const HOLD: Self = Self {
        bonus: 0.0,
        recommendation: Recommendation::Hold,
    };
}

pub fn classify(text: &str) -> Classification {
    SENTIMENT_RULES
        .iter()
        .find(|r| r.matches(text))
        .map(|r| Classification {
            bonus: r.bonus,
            recommendation: r.recommendation,
        })
        .unwrap_or(Classification::HOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_family_beats_buy_family() {
        let c = classify("Strong Buy on accumulation");
        assert_eq!(c.recommendation, Recommendation::StrongBuy);
        assert_eq!(c.bonus, 20.0);
    }

    #[test]
    fn languages_are_equivalent() {
        assert_eq!(classify("적극 매수 의견"), classify("Strong Buy"));
        assert_eq!(classify("매수 관점 유지"), classify("Buy the dip"));
    }

    #[test]
    fn strong_alone_is_enough() {
        assert_eq!(classify("Strong fundamentals").recommendation, Recommendation::StrongBuy);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(classify("buy"), Classification::HOLD);
        assert_eq!(classify("strong"), Classification::HOLD);
        assert_eq!(classify(""), Classification::HOLD);
    }
}
