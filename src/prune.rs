//! Pruning and convergence bookkeeping.

use nalgebra::DMatrix;
use crate::spice_error::{SpiceError, Result};

/// Weight of the endmember variance regularizer, \\( N u / ((M - 1)(1 - u)) \\).
///
/// Fails with [`SpiceError::InvalidConfiguration`] when `m < 2`.
pub fn lambda_for(n: usize, u: f64, m: usize) -> Result<f64>
{
    if m < 2 {
        return Err(SpiceError::InvalidConfiguration(
            format!("M: {} endmembers remain, at least 2 are required", m)
        ));
    }

    Ok(n as f64 * u / ((m - 1) as f64 * (1. - u)))
}

//

/// Result of a pruning step.
#[derive(Debug, Clone, PartialEq)]
pub struct Pruning
{
    /// Surviving endmembers, `d` x `m'`.
    pub endmembers: DMatrix<f64>,
    /// Proportions of the surviving endmembers, `n` x `m'`.
    pub proportions: DMatrix<f64>,
    /// Regularizer weight for `m'` endmembers.
    pub lambda: f64,
    /// Column indices (before pruning) of the removed endmembers, ascending.
    pub removed: Vec<usize>,
    /// Least among the per-endmember maximum proportions, before pruning.
    pub minmax_p: f64,
}

impl Pruning
{
    /// `true` if any endmember was removed.
    pub fn pruned(&self) -> bool
    {
        !self.removed.is_empty()
    }

    /// Number of surviving endmembers.
    pub fn m(&self) -> usize
    {
        self.endmembers.ncols()
    }
}

/// Removes endmembers whose maximum proportion over all observations is below `threshold`.
///
/// All flagged columns are removed from both matrices at once, and the survivors keep their order.
/// The matrices are rebuilt rather than edited in place.
/// * `e` is the `d` x `m` endmember matrix.
/// * `p` is the `n` x `m` proportion matrix.
/// * `lambda` is the current regularizer weight, kept when nothing is removed.
/// * `threshold` is the pruning threshold.
/// * `u` is the trade-off weight used to recompute `lambda`.
///
/// Fails with [`SpiceError::InvalidConfiguration`] if fewer than 2 endmembers would survive.
pub fn prune_and_check(e: DMatrix<f64>, p: DMatrix<f64>, lambda: f64, threshold: f64, u: f64) -> Result<Pruning>
{
    let (n, m) = p.shape();

    if e.ncols() != m {
        return Err(SpiceError::InvalidInput(format!("endmembers: {} columns must be {}", e.ncols(), m)));
    }

    let col_max: Vec<f64> = p.column_iter()
                             .map(|c| c.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                             .collect();
    let minmax_p = col_max.iter().cloned().fold(f64::INFINITY, f64::min);

    let (removed, keep): (Vec<usize>, Vec<usize>) = (0 .. m).partition(|j| col_max[*j] < threshold);

    if removed.is_empty() {
        return Ok(Pruning {
            endmembers: e,
            proportions: p,
            lambda,
            removed,
            minmax_p,
        });
    }

    let lambda = lambda_for(n, u, keep.len())?;

    let endmembers = e.select_columns(keep.iter());
    let proportions = p.select_columns(keep.iter());
    if endmembers.ncols() != proportions.ncols() || proportions.nrows() != n {
        return Err(SpiceError::InvalidInput(
            format!("pruning: rebuilt sizes {:?} and {:?} disagree", endmembers.shape(), proportions.shape())
        ));
    }

    log::debug!("pruned endmembers {:?}, {} remain, lambda {:.3e}", removed, keep.len(), lambda);

    Ok(Pruning {
        endmembers,
        proportions,
        lambda,
        removed,
        minmax_p,
    })
}

//

/// Terms of the regularized objective.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective
{
    /// Residual sum of squares, \\( \sum (X - E P^T)^2 \\).
    pub rss: f64,
    /// Sum over bands of the endmember variance.
    pub v: f64,
    /// Sparsity promoting term, \\( M \gamma \\).
    pub spt: f64,
    /// \\( (1 - u) RSS / N + u V + SPT \\).
    pub value: f64,
}

/// Evaluates the regularized objective.
///
/// Fails with [`SpiceError::InvalidConfiguration`] when fewer than 2 endmembers remain.
pub fn objective(x: &DMatrix<f64>, e: &DMatrix<f64>, p: &DMatrix<f64>, u: f64, gamma: f64) -> Result<Objective>
{
    let n = x.ncols();
    let m = e.ncols();

    if m < 2 {
        return Err(SpiceError::InvalidConfiguration(
            format!("M: {} endmembers remain, at least 2 are required", m)
        ));
    }

    let rss = (x - e * p.transpose()).norm_squared();

    let mf = m as f64;
    let v = (e.norm_squared() - e.column_sum().norm_squared() / mf) / (mf - 1.);

    let spt = mf * gamma;

    Ok(Objective {
        rss,
        v,
        spt,
        value: (1. - u) * rss / n as f64 + u * v + spt,
    })
}

//

#[test]
fn test_lambda_for()
{
    use float_eq::assert_float_eq;

    assert_float_eq!(lambda_for(100, 0.5, 3).unwrap(), 50., abs <= 1e-12);
    assert_float_eq!(lambda_for(6, 0.001, 5).unwrap(), 6. * 0.001 / (4. * 0.999), abs <= 1e-15);
    assert!(matches!(lambda_for(100, 0.5, 1), Err(SpiceError::InvalidConfiguration(_))));
    assert!(matches!(lambda_for(100, 0.5, 0), Err(SpiceError::InvalidConfiguration(_))));
}

#[test]
fn test_prune_keeps_order()
{
    let e = DMatrix::from_fn(2, 4, |r, c| (10 * c + r) as f64);
    let p = DMatrix::from_row_slice(3, 4, &[
        0.5, 0.0, 0.5, 0.0,
        0.2, 0.0, 0.3, 0.5,
        0.0, 0.0, 0.1, 0.9,
    ]);

    let rslt = prune_and_check(e, p, 1., 1e-9, 0.5).unwrap();

    assert!(rslt.pruned());
    assert_eq!(rslt.removed, vec![1]);
    assert_eq!(rslt.m(), 3);
    assert_eq!(rslt.minmax_p, 0.);
    assert_eq!(rslt.lambda, 3. * 0.5 / (2. * 0.5));
    assert_eq!(rslt.endmembers.row(0).iter().cloned().collect::<Vec<_>>(), vec![0., 20., 30.]);
    assert_eq!(rslt.proportions.column(2).iter().cloned().collect::<Vec<_>>(), vec![0.0, 0.5, 0.9]);
}

#[test]
fn test_prune_nothing()
{
    let e = DMatrix::from_element(2, 2, 1.);
    let p = DMatrix::from_row_slice(2, 2, &[
        0.7, 0.3,
        0.4, 0.6,
    ]);

    let rslt = prune_and_check(e.clone(), p.clone(), 0.25, 1e-9, 0.5).unwrap();

    assert!(!rslt.pruned());
    assert_eq!(rslt.lambda, 0.25);
    assert_eq!(rslt.minmax_p, 0.6);
    assert_eq!(rslt.endmembers, e);
    assert_eq!(rslt.proportions, p);
}

#[test]
fn test_prune_mismatch()
{
    let e = DMatrix::from_element(2, 3, 1.);
    let p = DMatrix::from_element(2, 2, 0.5);

    let rslt = prune_and_check(e, p, 1., 1e-9, 0.5);
    assert!(matches!(rslt, Err(SpiceError::InvalidInput(_))));
}

#[test]
fn test_prune_below_two()
{
    let e = DMatrix::from_element(2, 3, 1.);
    let p = DMatrix::from_row_slice(2, 3, &[
        1.0, 0.0, 0.0,
        0.9, 0.1, 0.0,
    ]);

    let rslt = prune_and_check(e, p, 1., 0.5, 0.5);
    assert!(matches!(rslt, Err(SpiceError::InvalidConfiguration(_))));
}

#[test]
fn test_objective()
{
    use float_eq::assert_float_eq;

    // two observations reconstructed exactly
    let x = DMatrix::from_column_slice(2, 2, &[
        1., 0.,
        0., 2.,
    ]);
    let e = x.clone();
    let p = DMatrix::<f64>::identity(2, 2);

    let obj = objective(&x, &e, &p, 0.5, 3.).unwrap();

    assert_float_eq!(obj.rss, 0., abs <= 1e-15);
    // band 0: 1 - 1/2, band 1: 4 - 4/2
    assert_float_eq!(obj.v, 2.5, abs <= 1e-15);
    assert_float_eq!(obj.spt, 6., abs <= 1e-15);
    assert_float_eq!(obj.value, 0.5 * 2.5 + 6., abs <= 1e-15);
}
