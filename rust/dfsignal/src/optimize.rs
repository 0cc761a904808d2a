//! Bounded derivative-free minimiser for small parameter vectors.

use std::cell::Cell;
use tracing::debug;

use crate::errors::{
    Result,
    SignalError,
};

/// Inclusive box constraint for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Self {
        if lower <= upper {
            Self { lower, upper }
        } else {
            Self {
                lower: upper,
                upper: lower,
            }
        }
    }

    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.lower, self.upper)
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

fn project(x: &mut [f64], bounds: &[Bound]) {
    for (v, b) in x.iter_mut().zip(bounds.iter()) {
        *v = b.clamp(*v);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    pub max_evals: usize,
    pub xtol: f64,
    pub ftol: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_evals: 20_000,
            xtol: 1e-7,
            ftol: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinimizeResult {
    pub x: Vec<f64>,
    pub fval: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Nelder-Mead simplex search where every trial point is projected into
/// `bounds` before it is evaluated.
pub fn nelder_mead_bounded<F>(
    f: F,
    x0: &[f64],
    bounds: &[Bound],
    config: &NelderMeadConfig,
) -> Result<MinimizeResult>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return Err(SignalError::empty("nelder_mead_bounded"));
    }
    if bounds.len() != n {
        return Err(SignalError::ExpectedSlicesSameLength {
            expected: n,
            other: bounds.len(),
            context: "nelder_mead_bounded: bounds".to_string(),
        });
    }

    let evals = Cell::new(0usize);
    let eval = |x: &[f64]| {
        evals.set(evals.get() + 1);
        let v = f(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut start = x0.to_vec();
    project(&mut start, bounds);
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for i in 0..n {
        let mut vertex = start.clone();
        let step = if vertex[i] != 0.0 {
            0.05 * vertex[i]
        } else {
            0.00025
        };
        vertex[i] += step;
        if !bounds[i].contains(vertex[i]) {
            vertex[i] = start[i] - step;
        }
        project(&mut vertex, bounds);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let (alpha, gamma, rho, sigma) = (1.0, 2.0, 0.5, 0.5);
    let mut converged = false;

    while evals.get() < config.max_evals {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let fspread = (values[n] - values[0]).abs();
        let xspread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0f64, f64::max);
        if fspread <= config.ftol * (1.0 + values[0].abs())
            && xspread <= config.xtol * (1.0 + max_abs(&simplex[0]))
        {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |t: f64| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(simplex[n].iter())
                .map(|(c, w)| c + t * (c - w))
                .collect();
            project(&mut p, bounds);
            p
        };

        let reflected = along(alpha);
        let fr = eval(&reflected);
        if fr < values[0] {
            let expanded = along(gamma);
            let fe = eval(&expanded);
            if fe < fr {
                simplex[n] = expanded;
                values[n] = fe;
            } else {
                simplex[n] = reflected;
                values[n] = fr;
            }
            continue;
        }
        if fr < values[n - 1] {
            simplex[n] = reflected;
            values[n] = fr;
            continue;
        }
        let (contracted, fc) = if fr < values[n] {
            let p = along(rho);
            let v = eval(&p);
            (p, v)
        } else {
            let p = along(-rho);
            let v = eval(&p);
            (p, v)
        };
        if fc < values[n].min(fr) {
            simplex[n] = contracted;
            values[n] = fc;
            continue;
        }
        let best = simplex[0].clone();
        for k in 1..=n {
            let mut p: Vec<f64> = best
                .iter()
                .zip(simplex[k].iter())
                .map(|(b, v)| b + sigma * (v - b))
                .collect();
            project(&mut p, bounds);
            values[k] = eval(&p);
            simplex[k] = p;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    if !converged {
        debug!("Nelder-Mead stopped after {} evaluations", evals.get());
    }
    Ok(MinimizeResult {
        x: simplex[best].clone(),
        fval: values[best],
        evaluations: evals.get(),
        converged,
    })
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}
