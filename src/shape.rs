//! Shape arithmetic shared by the backend and the tensor layer.

use crate::error::{Result, TensorError};

/// Number of elements in a shape. The empty shape holds one element.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides, in elements.
pub fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut acc = 1isize;
    for (stride, &dim) in strides.iter_mut().zip(shape).rev() {
        *stride = acc;
        acc *= dim as isize;
    }
    strides
}

/// Broadcast two shapes together.
///
/// Shapes are right-aligned, missing leading dimensions count as 1, and a
/// dimension of 1 stretches to match the other operand.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let a = pad_leading(a, rank);
    let b = pad_leading(b, rank);
    a.iter()
        .zip(&b)
        .map(|(&x, &y)| match (x, y) {
            _ if x == y => Ok(x),
            (1, _) => Ok(y),
            (_, 1) => Ok(x),
            _ => Err(TensorError::Broadcast(a.clone(), b.clone())),
        })
        .collect()
}

/// Prefix `shape` with size-1 axes until it reaches `rank`.
pub fn pad_leading(shape: &[usize], rank: usize) -> Vec<usize> {
    let mut out = vec![1; rank.saturating_sub(shape.len())];
    out.extend_from_slice(shape);
    out
}

/// Resolve a possibly negative axis against `rank`.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + rank as isize } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(TensorError::AxisOutOfBounds { axis, rank });
    }
    Ok(resolved as usize)
}

/// Shape with every axis in `axes` collapsed to 1 (rank is kept).
pub fn reduced_shape(shape: &[usize], axes: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
        .collect()
}

/// Inverse of a permutation: `inverse[order[i]] = i`.
pub fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (i, &axis) in order.iter().enumerate() {
        inverse[axis] = i;
    }
    inverse
}

/// True when `order` contains each of `0..rank` exactly once.
pub fn is_permutation(order: &[usize], rank: usize) -> bool {
    if order.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &axis in order {
        if axis >= rank || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
        assert!(contiguous_strides(&[]).is_empty());
    }

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(broadcast_shapes(&[45, 65], &[45, 1]).unwrap(), vec![45, 65]);
        assert_eq!(
            broadcast_shapes(&[1, 3, 1, 7, 1], &[2, 1, 5, 1, 8]).unwrap(),
            vec![2, 3, 5, 7, 8]
        );
        assert_eq!(broadcast_shapes(&[4, 1], &[5]).unwrap(), vec![4, 5]);
        assert_eq!(broadcast_shapes(&[3], &[2, 4, 3]).unwrap(), vec![2, 4, 3]);
    }

    #[test]
    fn test_broadcast_incompatible() {
        let err = broadcast_shapes(&[3, 4], &[3, 5]).unwrap_err();
        assert!(matches!(err, TensorError::Broadcast(..)));
    }

    #[test]
    fn test_normalize_axis() {
        assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
        assert_eq!(normalize_axis(0, 3).unwrap(), 0);
        assert!(normalize_axis(3, 3).is_err());
        assert!(normalize_axis(-4, 3).is_err());
    }

    #[test]
    fn test_permutation_helpers() {
        let order = [2, 0, 1];
        assert!(is_permutation(&order, 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1], 3));
        let inv = inverse_permutation(&order);
        assert_eq!(inv, vec![1, 2, 0]);
        let round: Vec<usize> = inv.iter().map(|&i| order[i]).collect();
        assert_eq!(round, vec![0, 1, 2]);
    }
}
