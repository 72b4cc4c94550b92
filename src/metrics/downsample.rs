/// Picks which timeline positions get drawn in the diagram.
///
/// Short runs are kept whole, medium runs are thinned to about 20 points,
/// long ones to about 30. The first point is always kept, the last one only
/// when the stride happens to land on it.
pub fn downsample_indices(len: usize) -> Vec<usize> {
    let stride = stride_for(len);
    if stride == 0 {
        return Vec::new();
    }
    (0..len).step_by(stride).collect()
}

/// Convenience wrapper returning the selected items themselves.
pub fn downsample<T: Clone>(items: &[T]) -> Vec<T> {
    downsample_indices(items.len())
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

/// Distance between kept points, or 0 for an empty input.
pub fn stride_for(len: usize) -> usize {
    let target = match len {
        0 => return 0,
        n if n < 30 => n,
        n if n < 100 => 20,
        _ => 30,
    };
    len.div_ceil(target)
}
