use serde::{Deserialize, Serialize};

/// Summary statistics over a scalar field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub min: f32,
    pub mean: f32,
    pub max: f32,
}

/// Min/mean/max of `values`. An empty slice yields all zeros.
pub fn compute_stats(values: &[f32]) -> FrameStats {
    let Some(&first) = values.first() else {
        return FrameStats {
            min: 0.0,
            mean: 0.0,
            max: 0.0,
        };
    };
    let mut min = first;
    let mut max = first;
    // f64 accumulator keeps the mean stable on large grids.
    let mut sum = 0f64;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v as f64;
    }
    FrameStats {
        min,
        mean: (sum / values.len() as f64) as f32,
        max,
    }
}
