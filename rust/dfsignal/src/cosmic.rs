use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::derivative::central_difference;
use crate::errors::{
    Result,
    SignalError,
    check_same_length,
};
use crate::nan::repair_nans_in_place;

/// Spikes closer than this to the previous one widen the erase window.
const NEARBY_SPIKE_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CosmicRayParams {
    /// A derivative this many times larger than the median one is a spike.
    pub factor: f64,
    pub max_iter: usize,
}

impl Default for CosmicRayParams {
    fn default() -> Self {
        Self {
            factor: 15.0,
            max_iter: 20,
        }
    }
}

/// Removes sharp single-sample spikes from `y`.
///
/// Each iteration looks at `|dy/dx|`, weighted by `sqrt(reference)` when a
/// reference is given. If the largest value is more than `factor` times the
/// median, the sample just before it is erased together with a window of
/// `nsteps` samples on either side, and the gap is linearly interpolated.
/// The window grows by one while consecutive spikes land within five samples
/// of each other and resets otherwise.
pub fn remove_cosmic_rays(
    x: &[f64],
    y: &[f64],
    reference: Option<&[f64]>,
    params: &CosmicRayParams,
) -> Result<Vec<f64>> {
    if y.is_empty() {
        return Err(SignalError::empty("remove_cosmic_rays"));
    }
    check_same_length(x, y, "remove_cosmic_rays: x/y")?;
    if let Some(reference) = reference {
        check_same_length(y, reference, "remove_cosmic_rays: y/reference")?;
    }

    let mut out = y.to_vec();
    repair_nans_in_place(&mut out)?;
    if out.len() < 3 {
        return Ok(out);
    }

    let n = out.len();
    let mut last_spike: Option<usize> = None;
    let mut nsteps = 1usize;
    let mut scratch = Vec::with_capacity(n);

    for iteration in 0..params.max_iter {
        let mut deriv = central_difference(x, &out)?;
        if let Some(reference) = reference {
            deriv
                .iter_mut()
                .zip(reference.iter())
                .for_each(|(d, r)| *d *= r.max(0.0).sqrt());
        }
        deriv.iter_mut().for_each(|d| *d = d.abs());

        let (argmax, max) = deriv
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, v)| {
                if v > acc.1 { (i, v) } else { acc }
            });
        scratch.clear();
        scratch.extend_from_slice(&deriv);
        let median = median_in_place(&mut scratch);

        if !(median.is_finite() && median > 0.0) {
            debug!("Median derivative is {}, skipping spike search", median);
            break;
        }
        if max / median <= params.factor {
            break;
        }

        let spike = argmax.saturating_sub(1);
        nsteps = match last_spike {
            Some(prev) if prev.abs_diff(spike) < NEARBY_SPIKE_SAMPLES => nsteps + 1,
            _ => 1,
        };
        last_spike = Some(spike);

        let lo = spike.saturating_sub(nsteps);
        let hi = (spike + nsteps).min(n - 1);
        debug!(
            "Cosmic ray iteration {}: erasing samples {}..={}",
            iteration, lo, hi
        );
        out[lo..=hi].iter_mut().for_each(|v| *v = f64::NAN);
        if let Err(e) = repair_nans_in_place(&mut out) {
            return Err(e.append_to_context("erase window covered the whole spectrum"));
        }
    }

    Ok(out)
}

/// Median of a scratch buffer; reorders the buffer.
pub(crate) fn median_in_place(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
