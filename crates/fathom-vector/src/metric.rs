//! Distance computation and distance→similarity conversion.
//!
//! Search results always report a similarity where higher is better,
//! regardless of the underlying metric: cosine distance d → 1 − d,
//! L2 distance d → 1/(1+d).

use fathom_core::config::DistanceMetric;

/// Distance between two vectors under `metric`. Lower is closer.
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => l2_distance(a, b),
    }
}

/// Convert a distance into a similarity score where higher is better.
pub fn similarity(metric: DistanceMetric, dist: f64) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - dist,
        DistanceMetric::L2 => 1.0 / (1.0 + dist),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += *x as f64 * *y as f64;
        norm_a += *x as f64 * *x as f64;
        norm_b += *y as f64 * *y as f64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
