use std::cmp::Ordering;

use rayon::prelude::*;

use crate::structures::Vertex;

/// Render priority: exponentiated total scale weighted by opacity.
#[inline]
pub fn priority(v: &Vertex) -> f32 {
    (v.log_scale[0] + v.log_scale[1] + v.log_scale[2]).exp() / (1.0 + (-v.opacity).exp())
}

/// Descending by key, NaN keys last.
#[inline]
fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Returns the permutation of vertex indices in descending priority.
///
/// Vertices with equal keys keep their file order, so the result is fully
/// determined by the input.
pub fn priority_order(vertices: &[Vertex]) -> Vec<usize> {
    let _span = tracing::trace_span!("priority_order").entered();

    let keys: Vec<f32> = vertices.par_iter().map(priority).collect();
    let mut order: Vec<usize> = (0..vertices.len()).collect();
    // par_sort_by is a stable merge sort.
    order.par_sort_by(|&a, &b| descending(keys[a], keys[b]));
    order
}
