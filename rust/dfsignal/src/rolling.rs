use arrayvec::ArrayVec;
use tracing::warn;

const MAX_WINDOW_SIZE: usize = 100;

/// Population standard deviation over the last `window_size` values added.
pub struct RollingStdCalculator {
    window_size: usize,
    data: ArrayVec<f64, MAX_WINDOW_SIZE>,
}

impl RollingStdCalculator {
    pub fn new(window_size: usize) -> Self {
        let mut window_size_use = window_size.max(1);
        if window_size > MAX_WINDOW_SIZE {
            warn!(
                "Window size {} is larger than max size {}. Clamping to max size.",
                window_size, MAX_WINDOW_SIZE
            );
            window_size_use = MAX_WINDOW_SIZE;
        }
        Self {
            window_size: window_size_use,
            data: ArrayVec::new(),
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.data.len() == self.window_size {
            self.data.remove(0);
        }
        self.data.push(value);
    }

    pub fn std(&self) -> Option<f64> {
        if self.data.len() < self.window_size {
            return None;
        }
        let n = self.data.len() as f64;
        let mean = self.data.iter().sum::<f64>() / n;
        let var = self.data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(var.sqrt())
    }
}

/// Local noise level: the standard deviation of a window centred on each
/// sample.
///
/// Odd window sizes are rounded up to the next even size. The input is
/// mirrored by half a window at both ends so every sample gets a full window.
pub fn rolling_std(values: &[f64], window_size: usize) -> Vec<f64> {
    let mut window = window_size.max(2);
    if window % 2 != 0 {
        window += 1;
    }
    let window = window.min(MAX_WINDOW_SIZE);
    let half = window / 2;
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let head = values.iter().take(half).rev();
    let tail = values.iter().rev().take(half);
    let padded: Vec<f64> = head
        .chain(values.iter())
        .chain(tail)
        .copied()
        .collect();

    let mut calc = RollingStdCalculator::new(window);
    let mut out = Vec::with_capacity(n);
    for (i, v) in padded.iter().enumerate() {
        calc.add(*v);
        if i + 1 >= window {
            if let Some(s) = calc.std() {
                out.push(s);
            }
        }
        if out.len() == n {
            break;
        }
    }
    // Inputs shorter than half a window never fill it.
    if out.len() < n {
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let fill = out.last().copied().unwrap_or(var.sqrt());
        out.resize(n, fill);
    }
    out
}
