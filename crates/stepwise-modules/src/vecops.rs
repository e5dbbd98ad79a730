//! Small vector helpers shared by the kernels.

/// `out = y + h·Σ w_j k_j`, skipping zero weights.
pub(crate) fn combine(out: &mut [f64], y: &[f64], h: f64, weights: &[f64], stages: &[Vec<f64>]) {
    out.copy_from_slice(y);
    accumulate(out, h, weights, stages);
}

/// `out += h·Σ w_j k_j`, skipping zero weights.
pub(crate) fn accumulate(out: &mut [f64], h: f64, weights: &[f64], stages: &[Vec<f64>]) {
    for (w, k) in weights.iter().zip(stages) {
        if *w == 0.0 {
            continue;
        }
        let hw = h * w;
        for (o, ki) in out.iter_mut().zip(k) {
            *o += hw * ki;
        }
    }
}

/// Whether every component is finite.
pub(crate) fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}
