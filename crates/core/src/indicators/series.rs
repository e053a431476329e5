//! Raw indicator series over a slice of bars.
//!
//! Every function returns one value per input bar and is defined for any
//! length, including the empty slice. Minimum-history rules live in
//! [`super::IndicatorEngine`], not here.

use crate::domain::bar::Bar;

/// Substitute for a zero denominator (flat bar range, zero negative flow).
pub const EPSILON: f64 = 1e-4;

/// On-Balance Volume, seeded at 0 on the first bar.
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut acc = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            if bar.close > prev {
                acc += bar.volume;
            } else if bar.close < prev {
                acc -= bar.volume;
            }
        }
        out.push(acc);
    }
    out
}

/// Close-location value of one bar, in [-1, 1] for well-formed bars.
pub fn close_location_value(bar: &Bar) -> f64 {
    let mut range = bar.high - bar.low;
    if range == 0.0 {
        range = EPSILON;
    }
    ((bar.close - bar.low) - (bar.high - bar.close)) / range
}

/// Accumulation/Distribution line: cumulative CLV × volume.
pub fn ad_line(bars: &[Bar]) -> Vec<f64> {
    let mut acc = 0.0;
    bars.iter()
        .map(|bar| {
            acc += close_location_value(bar) * bar.volume;
            acc
        })
        .collect()
}

/// Money Flow Index over `period` bars. `None` until a full window exists.
///
/// A bar's flow is positive when its typical price is above the previous
/// bar's, negative when below; the first bar contributes to neither side.
pub fn mfi(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }

    let mut positive = Vec::with_capacity(bars.len());
    let mut negative = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let tp = bar.typical_price();
        let flow = tp * bar.volume;
        let delta = if i == 0 {
            0.0
        } else {
            tp - bars[i - 1].typical_price()
        };
        positive.push(if delta > 0.0 { flow } else { 0.0 });
        negative.push(if delta < 0.0 { flow } else { 0.0 });
    }

    (0..bars.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let start = i + 1 - period;
            let pos: f64 = positive[start..=i].iter().sum();
            let mut neg: f64 = negative[start..=i].iter().sum();
            if neg == 0.0 {
                neg = EPSILON;
            }
            Some(100.0 - 100.0 / (1.0 + pos / neg))
        })
        .collect()
}

/// Simple moving average of volume. `None` until a full window exists.
pub fn volume_sma(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }
    (0..bars.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &bars[i + 1 - period..=i];
            Some(window.iter().map(|b| b.volume).sum::<f64>() / period as f64)
        })
        .collect()
}

/// Flags bars whose volume exceeds `threshold × SMA(period)`.
/// Bars without a defined SMA never surge.
pub fn volume_surges(bars: &[Bar], period: usize, threshold: f64) -> Vec<bool> {
    volume_sma(bars, period)
        .into_iter()
        .zip(bars)
        .map(|(sma, bar)| sma.is_some_and(|sma| bar.volume > sma * threshold))
        .collect()
}

/// Cumulative VWAP across the whole series (no session reset).
/// `None` while cumulative volume is still zero.
pub fn vwap(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    bars.iter()
        .map(|bar| {
            pv += bar.typical_price() * bar.volume;
            vol += bar.volume;
            (vol > 0.0).then(|| pv / vol)
        })
        .collect()
}

/// Percent change from the first value of the trailing `window` to the last
/// value, relative to the absolute base. A zero base yields 0.
pub fn window_change_pct(values: &[f64], window: usize) -> f64 {
    if window == 0 || values.len() < window {
        return 0.0;
    }
    let base = values[values.len() - window];
    let last = values[values.len() - 1];
    if base == 0.0 {
        return 0.0;
    }
    (last - base) / base.abs() * 100.0
}

/// Mean of the last `n` values; `None` for an empty input.
pub fn tail_mean(values: &[f64], n: usize) -> Option<f64> {
    let take = n.min(values.len());
    if take == 0 {
        return None;
    }
    let tail = &values[values.len() - take..];
    Some(tail.iter().sum::<f64>() / take as f64)
}

/// Short-window over long-window mean volume; 1.0 when the long mean is not positive.
pub fn volume_ratio(bars: &[Bar], short: usize, long: usize) -> f64 {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    match (tail_mean(&volumes, short), tail_mean(&volumes, long)) {
        (Some(s), Some(l)) if l > 0.0 => s / l,
        _ => 1.0,
    }
}

/// Close-to-close percent move over the last `lookback` bars; 0 without enough history.
pub fn momentum_pct(bars: &[Bar], lookback: usize) -> f64 {
    if bars.len() < lookback + 1 {
        return 0.0;
    }
    let last = bars[bars.len() - 1].close;
    let base = bars[bars.len() - 1 - lookback].close;
    if base == 0.0 {
        return 0.0;
    }
    (last / base - 1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars_from(closes: &[f64], volume: f64) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume,
            })
            .collect()
    }

    #[test]
    fn obv_follows_close_direction() {
        let bars = bars_from(&[10.0, 11.0, 11.0, 9.0, 12.0], 100.0);
        assert_eq!(obv(&bars), vec![0.0, 100.0, 100.0, 0.0, 100.0]);
    }

    #[test]
    fn obv_of_empty_series_is_empty() {
        assert!(obv(&[]).is_empty());
    }

    #[test]
    fn ad_line_uses_epsilon_for_flat_bars() {
        let mut bars = bars_from(&[10.0], 100.0);
        bars[0].high = 10.0;
        bars[0].low = 10.0;
        let ad = ad_line(&bars);
        assert_eq!(ad, vec![0.0]);
        assert!(ad[0].is_finite());
    }

    #[test]
    fn ad_line_accumulates_clv_times_volume() {
        let mut bars = bars_from(&[10.0, 10.0], 100.0);
        // Close at the high: CLV = 1.
        bars[0].close = 11.0;
        // Close at the low: CLV = -1.
        bars[1].close = 9.0;
        assert_eq!(ad_line(&bars), vec![100.0, 0.0]);
    }

    #[test]
    fn mfi_is_undefined_before_full_window() {
        let bars = bars_from(&(0..20).map(|i| 10.0 + i as f64).collect::<Vec<_>>(), 100.0);
        let m = mfi(&bars, 14);
        assert!(m[..13].iter().all(Option::is_none));
        assert!(m[13].is_some());
    }

    #[test]
    fn mfi_near_100_when_only_rising() {
        let bars = bars_from(&(0..20).map(|i| 10.0 + i as f64).collect::<Vec<_>>(), 100.0);
        let last = mfi(&bars, 14).last().copied().flatten().unwrap();
        assert!(last > 99.9 && last <= 100.0, "mfi={last}");
    }

    #[test]
    fn mfi_zero_when_only_falling() {
        let bars = bars_from(&(0..20).map(|i| 50.0 - i as f64).collect::<Vec<_>>(), 100.0);
        let last = mfi(&bars, 14).last().copied().flatten().unwrap();
        assert!(last.abs() < 1e-9, "mfi={last}");
    }

    #[test]
    fn surge_requires_defined_sma() {
        let mut bars = bars_from(&[10.0; 25], 100.0);
        bars[5].volume = 10_000.0;
        bars[24].volume = 5_000.0;
        let s = volume_surges(&bars, 20, 2.0);
        assert!(!s[5], "no SMA yet at bar 5");
        assert!(s[24]);
        assert_eq!(s.iter().filter(|x| **x).count(), 1);
    }

    #[test]
    fn vwap_of_constant_typical_price() {
        let bars = bars_from(&[10.0, 10.0, 10.0], 100.0);
        let v = vwap(&bars);
        assert!(v.iter().all(|x| (x.unwrap() - 10.0).abs() < 1e-12));
    }

    #[test]
    fn vwap_undefined_without_volume() {
        let bars = bars_from(&[10.0, 10.0], 0.0);
        assert_eq!(vwap(&bars), vec![None, None]);
    }

    #[test]
    fn window_change_uses_absolute_base() {
        let mut values = vec![0.0; 20];
        values[0] = -100.0;
        values[19] = -50.0;
        assert_eq!(window_change_pct(&values, 20), 50.0);
    }

    #[test]
    fn window_change_zero_base_is_zero() {
        let mut values = vec![0.0; 20];
        values[19] = 500.0;
        assert_eq!(window_change_pct(&values, 20), 0.0);
        assert_eq!(window_change_pct(&values[..5], 20), 0.0);
    }

    #[test]
    fn volume_ratio_defaults_to_one() {
        let bars = bars_from(&[10.0; 20], 0.0);
        assert_eq!(volume_ratio(&bars, 5, 20), 1.0);
    }

    #[test]
    fn momentum_over_lookback() {
        let bars = bars_from(&[100.0, 101.0, 102.0, 103.0, 104.0, 110.0], 1.0);
        assert!((momentum_pct(&bars, 5) - 10.0).abs() < 1e-9);
        assert_eq!(momentum_pct(&bars, 20), 0.0);
    }
}
