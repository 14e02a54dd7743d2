/// Trailing-window maximum. NaN for `i < window - 1` or when the window holds a NaN.
pub fn max_over(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, f64::NEG_INFINITY, f64::max)
}

/// Trailing-window minimum. NaN for `i < window - 1` or when the window holds a NaN.
pub fn min_over(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, f64::INFINITY, f64::min)
}

fn rolling(values: &[f64], window: usize, init: f64, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        // f64::max/min skip NaN, so propagate it explicitly
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = slice.iter().copied().fold(init, pick);
    }
    out
}

/// Index of the highest value in `values[start..end]`, first occurrence wins.
pub fn argmax(values: &[f64], start: usize, end: usize) -> Option<usize> {
    (start..end.min(values.len())).fold(None, |best, i| match best {
        Some(b) if values[b] >= values[i] => Some(b),
        _ => Some(i),
    })
}

/// Index of the lowest value in `values[start..end]`, first occurrence wins.
pub fn argmin(values: &[f64], start: usize, end: usize) -> Option<usize> {
    (start..end.min(values.len())).fold(None, |best, i| match best {
        Some(b) if values[b] <= values[i] => Some(b),
        _ => Some(i),
    })
}
