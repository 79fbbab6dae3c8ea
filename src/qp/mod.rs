/*!
QP solver adapter.

<script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-svg.js"></script>

Every backend solves the same problem shape:
\\[
\begin{array}{ll}
{\rm minimize} & {1 \over 2} x^T P x + q^T x \\\\
{\rm subject \ to} & G x \preceq h \\\\
& A x = b,
\end{array}
\\]
where \\( P \\) is symmetric positive semidefinite.
Backends are selected by [`QpBackend`] and configured per call by [`QpParam`];
nothing is kept in process-wide state.
*/

use std::str::FromStr;
use nalgebra::{DMatrix, DVector};
use crate::spice_error::{QpError, SpiceError};

mod totsu_qp;
mod pdipm;

pub use totsu_qp::TotsuQp;
pub use pdipm::{Pdipm, PdipmParam};

//

/// Quadratic program data, borrowed from the caller.
///
/// * `sym_p` is \\(P\\), `n` x `n`.
/// * `vec_q` is \\(q\\), `n`.
/// * `mat_g` is \\(G\\), `m` x `n`.
/// * `vec_h` is \\(h\\), `m`.
/// * `mat_a` is \\(A\\), `p` x `n`.
/// * `vec_b` is \\(b\\), `p`.
#[derive(Debug, Clone, Copy)]
pub struct ProbQP<'a>
{
    pub sym_p: &'a DMatrix<f64>,
    pub vec_q: &'a DVector<f64>,
    pub mat_g: &'a DMatrix<f64>,
    pub vec_h: &'a DVector<f64>,
    pub mat_a: &'a DMatrix<f64>,
    pub vec_b: &'a DVector<f64>,
}

impl<'a> ProbQP<'a>
{
    /// Checks sizes of the problem data.
    ///
    /// Returns a tuple of `(n, m, p)`.
    /// `m = 0` means no inequality constraints, `p = 0` means no equality constraints.
    pub fn dim(&self) -> Result<(usize, usize, usize), QpError>
    {
        let n = self.vec_q.len();
        let m = self.vec_h.len();
        let p = self.vec_b.len();

        if n == 0 {return Err(QpError::InvalidProblem("vec_q: 0 rows".into()));}

        if self.sym_p.shape() != (n, n) {
            return Err(QpError::InvalidProblem(format!("sym_p: size {:?} must be {:?}", self.sym_p.shape(), (n, n))));
        }
        if self.mat_g.shape() != (m, n) {
            return Err(QpError::InvalidProblem(format!("mat_g: size {:?} must be {:?}", self.mat_g.shape(), (m, n))));
        }
        if self.mat_a.shape() != (p, n) {
            return Err(QpError::InvalidProblem(format!("mat_a: size {:?} must be {:?}", self.mat_a.shape(), (p, n))));
        }

        Ok((n, m, p))
    }
}

//

/// Uniform call signature of the QP backends.
///
/// Implementations must be shareable among threads;
/// the abundance solver calls one instance from a worker pool.
pub trait QpSolver: Sync
{
    /// Solves `prob`.
    ///
    /// Returns the optimal \\(x\\) or the reason it could not be produced.
    fn solve_qp(&self, prob: &ProbQP) -> Result<DVector<f64>, QpError>;
}

//

/// Per-call QP solver parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QpParam
{
    /// Max iteration number of the first-order backend. `None` means no upper limit.
    pub max_iter: Option<usize>,
    /// Tolerance of the primal residual, dual residual and duality gap (first-order backend).
    pub eps_acc: f64,
    /// Tolerance of the unboundness and infeasibility (first-order backend).
    pub eps_inf: f64,
    /// Tolerance of small positive value to avoid division by zero.
    pub eps_zero: f64,
    /// Period of iterations to output progress log (first-order backend, debug/trace level).
    pub log_period: usize,
    /// Tolerance of residuals (interior-point backend).
    pub ipm_eps: f64,
    /// Tolerance of complementary slackness (interior-point backend).
    pub ipm_eps_gap: f64,
    /// Max Newton iterations (interior-point backend).
    pub ipm_n_loop: usize,
}

impl Default for QpParam
{
    fn default() -> Self
    {
        QpParam {
            max_iter: Some(100_000),
            eps_acc: 1e-6,
            eps_inf: 1e-6,
            eps_zero: 1e-12,
            log_period: 10_000,
            ipm_eps: 1e-10,
            ipm_eps_gap: 1e-13,
            ipm_n_loop: 256,
        }
    }
}

//

/// Selects a QP backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QpBackend
{
    /// Dense primal-dual interior-point method, accurate to the vertices of the simplex.
    #[default]
    Primary,
    /// First-order conic solver of `totsu`, with a looser accuracy.
    Secondary,
}

impl QpBackend
{
    /// Creates the backend configured by `par`.
    pub fn solver(self, par: &QpParam) -> Box<dyn QpSolver>
    {
        match self {
            QpBackend::Primary => Box::new(Pdipm::new(PdipmParam::from(par))),
            QpBackend::Secondary => Box::new(TotsuQp::new(par)),
        }
    }
}

impl FromStr for QpBackend
{
    type Err = SpiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "pdipm" | "cvxopt" => Ok(QpBackend::Primary),
            "secondary" | "totsu" | "qpp" => Ok(QpBackend::Secondary),
            _ => Err(SpiceError::InvalidConfiguration(format!("qp_solver: unknown backend '{}'", s))),
        }
    }
}

impl core::fmt::Display for QpBackend
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        match self {
            QpBackend::Primary => write!(f, "primary"),
            QpBackend::Secondary => write!(f, "secondary"),
        }
    }
}

//

#[test]
fn test_backend_from_str()
{
    assert_eq!("primary".parse::<QpBackend>(), Ok(QpBackend::Primary));
    assert_eq!("Totsu".parse::<QpBackend>(), Ok(QpBackend::Secondary));
    assert_eq!("CVXOPT".parse::<QpBackend>(), Ok(QpBackend::Primary));
    assert_eq!("qpp".parse::<QpBackend>(), Ok(QpBackend::Secondary));
    assert!(matches!("gurobi".parse::<QpBackend>(), Err(SpiceError::InvalidConfiguration(_))));
}

#[test]
fn test_dim_mismatch()
{
    let sym_p = DMatrix::<f64>::identity(2, 2);
    let vec_q = DVector::<f64>::zeros(2);
    let mat_g = DMatrix::<f64>::zeros(1, 3);
    let vec_h = DVector::<f64>::zeros(1);
    let mat_a = DMatrix::<f64>::zeros(0, 2);
    let vec_b = DVector::<f64>::zeros(0);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };
    assert!(matches!(prob.dim(), Err(QpError::InvalidProblem(_))));
}
