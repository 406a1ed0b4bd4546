//! Dense linear solver for the Levenberg-Marquardt normal equations.

/// Solves `A x = b` for a small dense system stored row-major in `a`.
///
/// Gaussian elimination with partial pivoting. Returns `None` if the matrix
/// is singular (pivot below `1e-12`) or the result is not finite.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve(a: &[f64], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n * n {
        return None;
    }
    let mut matrix = a.to_vec();
    let mut rhs = b.to_vec();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = matrix[col * n + col].abs();
        for row in (col + 1)..n {
            let v = matrix[row * n + col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }
        if !(max_val >= 1e-12) {
            return None;
        }

        if max_row != col {
            for j in 0..n {
                matrix.swap(col * n + j, max_row * n + j);
            }
            rhs.swap(col, max_row);
        }

        let pivot = matrix[col * n + col];
        for row in (col + 1)..n {
            let factor = matrix[row * n + col] / pivot;
            for j in col..n {
                matrix[row * n + j] -= factor * matrix[col * n + j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..n {
            sum -= matrix[i * n + j] * x[j];
        }
        x[i] = sum / matrix[i * n + i];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::solve;

    #[test]
    fn solves_diagonal_system() {
        let a = [2.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 5.0];
        let x = solve(&a, &[2.0, 8.0, 15.0]).unwrap();
        assert_eq!(x, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn pivots_on_zero_diagonal() {
        let a = [0.0, 1.0, 1.0, 0.0];
        let x = solve(&a, &[2.0, 1.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_returns_none() {
        let a = [1.0, 2.0, 2.0, 4.0];
        assert!(solve(&a, &[1.0, 2.0]).is_none());
        assert!(solve(&[0.0; 4], &[1.0, 1.0]).is_none());
    }
}
