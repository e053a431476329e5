//! Bilingual per-ticker investment summaries for the top quant rows.

use crate::domain::contract::{QuantScore, SentimentEntry};
use crate::llm::TextGenerator;
use crate::storage::summaries::SummaryBook;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Korean,
    English,
}

pub fn summary_prompt(q: &QuantScore, lang: Language) -> String {
    let score = format!("Score: {}/100", q.composite_score);
    let upside = q
        .target_upside
        .map(|u| format!(", Target upside: {u:.1}%"))
        .unwrap_or_default();
    match lang {
        Language::Korean => format!(
            "종목: {} ({})\n정보: {score}{upside}\n요청: 수급, 펀더멘털, 전략을 포함해 3-4문장으로 투자 의견을 요약하세요. 이모지는 쓰지 마세요.",
            q.ticker, q.name
        ),
        Language::English => format!(
            "Stock: {} ({})\nInfo: {score}{upside}\nRequest: a 3-4 sentence investment summary covering flows, fundamentals and strategy. No emojis.",
            q.ticker, q.name
        ),
    }
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub top_n: usize,
    pub max_age: Option<Duration>,
    /// Pause between tickers.
    pub delay: std::time::Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryRunStats {
    pub considered: usize,
    pub generated: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Generates summaries for tickers missing from (or stale in) `book`.
/// A ticker whose generation fails is left out so the next run retries it.
/// The book is saved to `path` as it grows.
pub async fn generate_missing(
    generator: &dyn TextGenerator,
    book: &mut SummaryBook,
    quants: &[QuantScore],
    opts: &SummaryOptions,
    path: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<SummaryRunStats> {
    let mut stats = SummaryRunStats::default();

    for q in quants.iter().take(opts.top_n) {
        stats.considered += 1;
        if !book.needs_summary(&q.ticker, now, opts.max_age) {
            stats.kept += 1;
            continue;
        }
        if stats.generated + stats.failed > 0 && !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }

        match generate_pair(generator, q).await {
            Ok((ko, en)) => {
                book.upsert(q.ticker.clone(), SentimentEntry::new(ko, en, now));
                stats.generated += 1;
                book.save(path)?;
                tracing::info!(ticker = %q.ticker, "summary generated");
            }
            Err(err) => {
                stats.failed += 1;
                tracing::warn!(ticker = %q.ticker, error = %format!("{err:#}"), "summary generation failed");
            }
        }
    }

    tracing::info!(
        considered = stats.considered,
        generated = stats.generated,
        kept = stats.kept,
        failed = stats.failed,
        total = book.len(),
        "summary run finished"
    );
    Ok(stats)
}

/// Korean first; English is only requested once Korean succeeded.
async fn generate_pair(generator: &dyn TextGenerator, q: &QuantScore) -> anyhow::Result<(String, String)> {
    let ko = generator.generate(&summary_prompt(q, Language::Korean)).await?;
    let en = generator.generate(&summary_prompt(q, Language::English)).await?;
    Ok((ko, en))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        fail_for: &'static str,
    }

    #[async_trait::async_trait]
    impl TextGenerator for Scripted {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains(self.fail_for) {
                anyhow::bail!("rate limited");
            }
            if prompt.starts_with("종목") {
                Ok("적극 매수 관점".to_string())
            } else {
                Ok("Strong Buy".to_string())
            }
        }
    }

    fn quant(ticker: &str) -> QuantScore {
        QuantScore {
            ticker: ticker.to_string(),
            name: format!("{ticker} Inc"),
            sector: None,
            composite_score: 70.0,
            current_price: 10.0,
            target_upside: Some(12.5),
        }
    }

    #[test]
    fn prompts_carry_score_and_language() {
        let ko = summary_prompt(&quant("AAPL"), Language::Korean);
        let en = summary_prompt(&quant("AAPL"), Language::English);
        assert!(ko.starts_with("종목: AAPL"));
        assert!(en.contains("Score: 70/100"));
        assert!(en.contains("Target upside: 12.5%"));
    }

    #[tokio::test]
    async fn skips_existing_and_drops_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_summaries.json");
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap();

        let mut book = SummaryBook::default();
        book.upsert("AAPL", SentimentEntry::new("기존".into(), "old".into(), now));

        let generator = Scripted {
            calls: AtomicUsize::new(0),
            fail_for: "TSLA",
        };
        let quants = vec![quant("AAPL"), quant("NVDA"), quant("TSLA"), quant("MSFT")];
        let opts = SummaryOptions {
            top_n: 3,
            max_age: None,
            delay: std::time::Duration::ZERO,
        };

        let stats = generate_missing(&generator, &mut book, &quants, &opts, &path, now)
            .await
            .unwrap();

        assert_eq!(
            stats,
            SummaryRunStats {
                considered: 3,
                generated: 1,
                kept: 1,
                failed: 1
            }
        );
        assert_eq!(book.get("AAPL").unwrap().summary, "기존");
        assert_eq!(book.get("NVDA").unwrap().summary, "적극 매수 관점");
        assert_eq!(book.get("NVDA").unwrap().summary_en, "Strong Buy");
        assert!(book.get("TSLA").is_none());
        assert!(book.get("MSFT").is_none());
        assert_eq!(SummaryBook::load(&path).unwrap(), book);
        // NVDA asks twice; TSLA stops after the failed Korean prompt
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }
}
