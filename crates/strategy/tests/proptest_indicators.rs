use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, Error, PriceSeries};
use strategy::detectors::{EmaConfluence, FibZone, MaBreakout, PivotTrend, SignalDetector, StructureBreak};
use strategy::indicators::{self, MaKind};
use strategy::{fibonacci_levels, pivot_levels, FibDirection, LevelKey};

fn series_from(closes: &[f64]) -> PriceSeries {
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let open = if i == 0 { c } else { closes[i - 1] };
            Candle {
                timestamp: Utc.timestamp_opt(1_600_000_000 + i as i64 * 60, 0).unwrap(),
                open,
                high: open.max(c) + 0.25,
                low: open.min(c) - 0.25,
                close: c,
                volume: 1.0,
            }
        })
        .collect();
    PriceSeries::new(candles).unwrap()
}

fn closes_strategy(min_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-2.0f64..2.0, min_len..min_len + 60).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(1.0);
                price
            })
            .collect()
    })
}

proptest! {
    /// Rolling max of highs equals the slice maximum once the window is full.
    #[test]
    fn rolling_max_matches_window_maximum(closes in closes_strategy(5), window in 1usize..10) {
        let series = series_from(&closes);
        let highs = series.highs();
        let rolled = indicators::rolling_max(&series, window);
        for i in 0..closes.len() {
            if i + 1 < window {
                prop_assert!(rolled[i].is_nan());
            } else {
                let expected = highs[i + 1 - window..=i].iter().cloned().fold(f64::MIN, f64::max);
                prop_assert_eq!(rolled[i], expected);
            }
        }
    }

    /// Indicator values at i only depend on candles up to i.
    #[test]
    fn indicators_have_no_lookahead(closes in closes_strategy(40), cut in 20usize..40) {
        let full = series_from(&closes);
        let prefix = full.prefix(cut);
        for kind in [MaKind::Sma, MaKind::Ema, MaKind::Wma, MaKind::Hma, MaKind::Rma] {
            let a = indicators::moving_average(&full, 10, kind);
            let b = indicators::moving_average(&prefix, 10, kind);
            for i in 0..cut {
                prop_assert!(a[i] == b[i] || (a[i].is_nan() && b[i].is_nan()));
            }
        }
        let a = indicators::rsi(&full, 14);
        let b = indicators::rsi(&prefix, 14);
        for i in 0..cut {
            prop_assert!(a[i] == b[i] || (a[i].is_nan() && b[i].is_nan()));
        }
    }

    /// Every detector evaluates the last bar, and refuses series under its lookback.
    #[test]
    fn detectors_anchor_at_last_bar(closes in closes_strategy(20)) {
        let series = series_from(&closes);
        let detectors: Vec<Box<dyn SignalDetector>> = vec![
            Box::new(MaBreakout::default()),
            Box::new(EmaConfluence { ema_length: 20, backcandles: 5 }),
            Box::new(FibZone { ema_length: 20, backcandles: 10, gap: 3, zone_threshold: 0.5, price_diff_threshold: 0.1 }),
            Box::new(StructureBreak { pending_bars: 8, range_bars: 10 }),
            Box::new(PivotTrend::default()),
        ];
        for d in &detectors {
            match d.detect(&series) {
                Ok(signal) => {
                    prop_assert!(series.len() >= d.lookback());
                    prop_assert_eq!(signal.anchor_index, series.len() - 1);
                }
                Err(Error::InsufficientData { have, need }) => {
                    prop_assert_eq!(have, series.len());
                    prop_assert_eq!(need, d.lookback());
                }
                Err(other) => prop_assert!(false, "{} failed: {}", d.name(), other),
            }
        }
    }

    /// Fibonacci identities for both anchors.
    #[test]
    fn fib_endpoints(low in 1.0f64..1000.0, span in 0.01f64..500.0) {
        let high = low + span;
        let up = fibonacci_levels(high, low, FibDirection::Up);
        let down = fibonacci_levels(high, low, FibDirection::Down);
        prop_assert!((up.get("0.000").unwrap() - high).abs() < 1e-9);
        prop_assert!((up.get("1.000").unwrap() - low).abs() < 1e-9);
        prop_assert!((down.get("0.000").unwrap() - low).abs() < 1e-9);
        prop_assert!((down.get("1.000").unwrap() - high).abs() < 1e-9);
        // retracements stay inside the range
        for r in [0.236, 0.382, 0.5, 0.618, 0.786] {
            let v = up.level(LevelKey::fib(r)).unwrap();
            prop_assert!(v >= low - 1e-9 && v <= high + 1e-9);
        }
    }

    /// Pivot ladder is ordered S3 <= S2 <= S1 <= PP <= R1 <= R2 <= R3 for a valid bar.
    #[test]
    fn pivot_ladder_is_ordered(low in 1.0f64..1000.0, span in 0.0f64..100.0, pos in 0.0f64..=1.0) {
        let high = low + span;
        let close = low + span * pos;
        let levels = pivot_levels(high, low, close);
        let order = [
            LevelKey::S3, LevelKey::S2, LevelKey::S1, LevelKey::Pp,
            LevelKey::R1, LevelKey::R2, LevelKey::R3,
        ];
        let values: Vec<f64> = order.iter().map(|k| levels.level(*k).unwrap()).collect();
        for w in values.windows(2) {
            prop_assert!(w[0] <= w[1] + 1e-9, "{:?}", values);
        }
    }
}
