// src/permute.rs

//! In-place reordering of fixed-width elements by cycle following.

use nalgebra::{DMatrix, Scalar};

/// Reorders `data` so that element `i` afterwards holds the element that was at
/// `perm[i]` before the call.
///
/// `data` is a contiguous array of `perm.len()` elements, each `width` values wide (a
/// Ritz value has width 1, an eigenvector column has width `basis_size`). Only `width`
/// values of `scratch` are used as extra storage and every element is moved once along
/// its cycle.
///
/// `perm` is consumed: entries are marked as fixed while their element is placed, so on
/// return it is the identity. Callers that need to apply the same reordering to a second
/// array must hand in an independent copy.
pub fn permute_in_place<T: Copy>(data: &mut [T], width: usize, perm: &mut [usize], scratch: &mut [T]) {
    let n = perm.len();
    assert_eq!(data.len(), n * width, "data must hold perm.len() elements of the given width");
    assert!(scratch.len() >= width, "scratch must hold one element");
    debug_assert!(is_bijection(perm), "perm must be a permutation of 0..n");

    if width == 0 {
        perm.iter_mut().enumerate().for_each(|(i, p)| *p = i);
        return;
    }

    let scratch = &mut scratch[..width];
    let mut current = 0;

    loop {
        while current < n && perm[current] == current {
            current += 1;
        }
        if current >= n {
            return;
        }

        scratch.copy_from_slice(&data[current * width..(current + 1) * width]);

        let mut destination = current;
        while perm[destination] != current {
            let source = perm[destination];
            data.copy_within(source * width..(source + 1) * width, destination * width);
            perm[destination] = destination;
            destination = source;
        }

        data[destination * width..(destination + 1) * width].copy_from_slice(scratch);
        perm[destination] = destination;

        current += 1;
    }
}

/// Reorders the columns of a column-major matrix: column `i` receives the column that was
/// at `perm[i]`. Same consumption rule for `perm` as [`permute_in_place`].
pub fn permute_columns<T: Scalar + Copy>(matrix: &mut DMatrix<T>, perm: &mut [usize]) {
    assert_eq!(matrix.ncols(), perm.len(), "one permutation entry per column");
    let width = matrix.nrows();
    let Some(&fill) = matrix.as_slice().first() else {
        perm.iter_mut().enumerate().for_each(|(i, p)| *p = i);
        return;
    };
    let mut scratch = vec![fill; width];
    permute_in_place(matrix.as_mut_slice(), width, perm, &mut scratch);
}

fn is_bijection(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &p in perm {
        if p >= perm.len() || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}
