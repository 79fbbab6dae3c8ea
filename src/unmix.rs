//! Abundance solver.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use crate::qp::{ProbQP, QpSolver};
use crate::spice_error::{SpiceError, Result};

/// Finds the proportions of each endmember in each observation.
///
/// <script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
/// <script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-svg.js"></script>
///
/// For every observation \\(x_i\\) the QP
/// \\[
/// \begin{array}{ll}
/// {\rm minimize} & {1 \over 2} p^T (2 E^T E) p + (-2 E^T x_i + g)^T p \\\\
/// {\rm subject \ to} & 0 \preceq p \preceq 1 \\\\
/// & {\bf 1}^T p = 1
/// \end{array}
/// \\]
/// is solved, where \\( g_j = \gamma / \sum_i P^{\rm prev}_{ij} \\).
/// Endmembers with little weight in `p_prev` are penalized more.
///
/// Returns the new `n` x `m` proportion matrix, with negative round-off clamped to zero.
/// * `x` is the `d` x `n` observation matrix.
/// * `e` is the `d` x `m` endmember matrix.
/// * `gamma` is the sparsity strength.
/// * `p_prev` is the previous `n` x `m` proportion matrix.
/// * `solver` is the QP backend.
///
/// Observations are solved in parallel; row `i` depends only on column `i` of `x`.
pub fn unmix(x: &DMatrix<f64>, e: &DMatrix<f64>, gamma: f64, p_prev: &DMatrix<f64>,
             solver: &dyn QpSolver) -> Result<DMatrix<f64>>
{
    let (d, n) = x.shape();
    let m = e.ncols();

    if e.nrows() != d {
        return Err(SpiceError::InvalidInput(format!("endmembers: {} rows must be {}", e.nrows(), d)));
    }
    if p_prev.shape() != (n, m) {
        return Err(SpiceError::InvalidInput(format!("proportions: size {:?} must be {:?}", p_prev.shape(), (n, m))));
    }

    // shared across observations
    let sym_p = e.tr_mul(e) * 2.;
    let gamma_vec = if gamma == 0. {
        DVector::zeros(m)
    }
    else {
        p_prev.row_sum().transpose().map(|s| gamma / s)
    };

    let mut mat_g = DMatrix::zeros(2 * m, m);
    let mut vec_h = DVector::zeros(2 * m);
    for j in 0 .. m {
        mat_g[(j, j)] = -1.;
        mat_g[(m + j, j)] = 1.;
        vec_h[m + j] = 1.;
    }
    let mat_a = DMatrix::from_element(1, m, 1.);
    let vec_b = DVector::from_element(1, 1.);

    log::trace!("unmix: {} observations, {} endmembers", n, m);

    let rows = (0 .. n).into_par_iter().map(|i| {
        let vec_q = e.tr_mul(&x.column(i)) * -2. + &gamma_vec;

        let prob = ProbQP {
            sym_p: &sym_p, vec_q: &vec_q,
            mat_g: &mat_g, vec_h: &vec_h,
            mat_a: &mat_a, vec_b: &vec_b,
        };
        solver.solve_qp(&prob)
              .map_err(|cause| SpiceError::QpFailure {index: i, cause})
    }).collect::<Result<Vec<_>>>()?;

    Ok(DMatrix::from_fn(n, m, |i, j| rows[i][j].max(0.)))
}

//

#[cfg(test)]
struct FixedQp(Vec<f64>);

#[cfg(test)]
impl QpSolver for FixedQp
{
    fn solve_qp(&self, prob: &ProbQP) -> core::result::Result<DVector<f64>, crate::spice_error::QpError>
    {
        if self.0.is_empty() {
            Err(crate::spice_error::QpError::Infeasible)
        }
        else {
            assert_eq!(prob.vec_q.len(), self.0.len());
            Ok(DVector::from_column_slice(&self.0))
        }
    }
}

#[test]
fn test_unmix_vertices()
{
    use float_eq::assert_float_eq;
    use crate::qp::{Pdipm, PdipmParam};

    let e = DMatrix::from_row_slice(2, 2, &[
        1., 0.,
        0., 1.,
    ]);
    let x = DMatrix::from_column_slice(2, 3, &[
        1.0, 0.0,
        0.0, 1.0,
        0.5, 0.5,
    ]);
    let p_prev = DMatrix::from_element(3, 2, 0.5);

    let p = unmix(&x, &e, 0., &p_prev, &Pdipm::new(PdipmParam::default())).unwrap();

    let ref_array = &[ // column-major
        1.0, 0.0, 0.5,
        0.0, 1.0, 0.5,
    ];
    assert_float_eq!(p.as_slice(), ref_array.as_ref(), abs_all <= 1e-6);
}

#[test]
fn test_unmix_clamps_negative()
{
    let e = DMatrix::from_element(3, 2, 1.);
    let x = DMatrix::from_element(3, 4, 1.);
    let p_prev = DMatrix::from_element(4, 2, 0.5);

    let p = unmix(&x, &e, 5., &p_prev, &FixedQp(vec![-1e-12, 1.])).unwrap();

    assert_eq!(p.shape(), (4, 2));
    assert!(p.column(0).iter().all(|v| *v == 0.));
    assert!(p.column(1).iter().all(|v| *v == 1.));
}

#[test]
fn test_unmix_failure_tagged()
{
    let e = DMatrix::from_element(3, 2, 1.);
    let x = DMatrix::from_element(3, 1, 1.);
    let p_prev = DMatrix::from_element(1, 2, 0.5);

    let r = unmix(&x, &e, 5., &p_prev, &FixedQp(Vec::new()));
    assert_eq!(r, Err(SpiceError::QpFailure {index: 0, cause: crate::spice_error::QpError::Infeasible}));
}
