//! Numeric helpers shared by the decoders and kernels.

/// Returns the index and value of the largest score.
///
/// Ties resolve to the first occurrence. NaN entries never win unless the
/// sequence starts with one, in which case any finite score replaces it.
pub(crate) fn argmax_first<I>(scores: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (idx, value) in scores.into_iter().enumerate() {
        match best {
            None => best = Some((idx, value)),
            Some((_, current)) if value > current || (current.is_nan() && !value.is_nan()) => {
                best = Some((idx, value))
            }
            Some(_) => {}
        }
    }
    best
}

/// Returns true when `value` clears `threshold`; NaN never does.
#[inline]
pub(crate) fn passes(value: f32, threshold: f32) -> bool {
    value >= threshold
}
