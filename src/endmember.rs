//! Endmember update.

use nalgebra::DMatrix;
use crate::spice_error::{SpiceError, Result};

/// Re-estimates endmembers given proportions.
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-svg.js"></script>
///
/// Ridge-regularized least squares
/// \\[
/// E = \left( \left( P^T P + \lambda \left( I - {{\bf 1}{\bf 1}^T \over M} \right) \right)^{-1} P^T X^T \right)^T,
/// \\]
/// whose regularizer pulls the endmembers toward their centroid.
///
/// Returns the `d` x `m` endmember matrix, or [`SpiceError::SingularMatrix`].
/// * `x` is the `d` x `n` observation matrix.
/// * `p` is the `n` x `m` proportion matrix.
/// * `lambda` is the weight of the regularizer.
pub fn update_endmembers(x: &DMatrix<f64>, p: &DMatrix<f64>, lambda: f64) -> Result<DMatrix<f64>>
{
    let m = p.ncols();

    if x.ncols() != p.nrows() {
        return Err(SpiceError::InvalidInput(format!("proportions: {} rows must be {}", p.nrows(), x.ncols())));
    }

    let centering = DMatrix::<f64>::identity(m, m)
                    - DMatrix::from_element(m, m, 1. / m as f64);
    let lhs = p.tr_mul(p) + centering * lambda;

    let inv = lhs.try_inverse().ok_or(SpiceError::SingularMatrix)?;
    let e = (inv * (x * p).transpose()).transpose();

    // near-singular systems come back with overflowed entries
    if e.iter().all(|v| v.is_finite()) {
        Ok(e)
    }
    else {
        Err(SpiceError::SingularMatrix)
    }
}

//

#[test]
fn test_update_exact()
{
    use float_eq::assert_float_eq;

    let x = DMatrix::from_column_slice(3, 2, &[
        1., 2., 3.,
        4., 5., 6.,
    ]);
    let p = DMatrix::<f64>::identity(2, 2);

    let e = update_endmembers(&x, &p, 0.).unwrap();
    assert_float_eq!(e.as_slice(), x.as_slice(), abs_all <= 1e-12);
}

#[test]
fn test_update_toward_centroid()
{
    use float_eq::assert_float_eq;

    let x = DMatrix::<f64>::identity(2, 2);
    let p = DMatrix::<f64>::identity(2, 2);

    let e = update_endmembers(&x, &p, 1.).unwrap();

    let ref_array = &[ // column-major
        0.75, 0.25,
        0.25, 0.75,
    ];
    assert_float_eq!(e.as_slice(), ref_array.as_ref(), abs_all <= 1e-12);
}

#[test]
fn test_update_singular()
{
    let x = DMatrix::from_element(3, 2, 1.);
    let p = DMatrix::from_row_slice(2, 2, &[
        1., 0.,
        1., 0.,
    ]);

    assert_eq!(update_endmembers(&x, &p, 0.), Err(SpiceError::SingularMatrix));
}
