use super::ma;

/// MACD (Moving Average Convergence/Divergence) columns.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period).
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd_lines(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ma::ema(closes, fast);
    let slow_ema = ma::ema(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ma::ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| l - s)
        .collect();
    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_warmup_lengths() {
        let m = macd_lines(&trending_up(60), 12, 26, 9);
        assert!(m.line[24].is_nan());
        assert!(!m.line[25].is_nan());
        assert!(m.signal[32].is_nan());
        assert!(!m.signal[33].is_nan());
        assert!(m.histogram[32].is_nan());
    }

    #[test]
    fn macd_positive_on_steady_uptrend() {
        let m = macd_lines(&trending_up(60), 12, 26, 9);
        assert!(*m.line.last().unwrap() > 0.0);
    }

    #[test]
    fn histogram_is_line_minus_signal() {
        let m = macd_lines(&trending_up(40), 3, 6, 3);
        let i = 39;
        assert!((m.histogram[i] - (m.line[i] - m.signal[i])).abs() < 1e-12);
    }
}
