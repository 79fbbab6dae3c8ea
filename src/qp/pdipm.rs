/*!
Primal-dual interior point method

<script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-svg.js"></script>

Slack variables \\( s \in \mathbb{R}^m \\) turn the inequalities into
\\[
\begin{array}{ll}
{\rm minimize}_{x,s} & {1 \over 2} x^T P x + q^T x \\\\
{\rm subject \ to} & G x + s = h \\\\
& A x = b \\\\
& s \succeq 0,
\end{array}
\\]
with dual variables \\( z \succeq 0 \\) for \\( G x + s = h \\) and \\( y \\) for \\( A x = b \\).
Starting from \\( s = z = {\bf 1} \\), which need not satisfy the equalities,
each iteration takes a Mehrotra predictor-corrector step.
The Newton system is reduced by eliminating \\( \Delta s \\) and \\( \Delta z \\):
\\[
\left[ \begin{array}{cc}
P + G^T S^{-1} Z G & A^T \\\\
A & 0
\end{array} \right]
\left[ \begin{array}{c} \Delta x \\\\ \Delta y \end{array} \right]
= \cdots
\\]
*/

use nalgebra::{DMatrix, DVector};
use crate::spice_error::QpError;
use super::{ProbQP, QpParam, QpSolver};

/// Primal-dual interior-point method parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PdipmParam
{
    /// Tolerance of the primal residuals, and of the dual residuals relative to \\( 1 + |q_j| \\).
    pub eps: f64,
    /// Tolerance of the complementary slackness \\( s_i z_i \\),
    /// applied to \\( s_i \\) alone where \\( z_i > 1 \\).
    pub eps_gap: f64,
    /// The factor to determine a step size short of the boundary.
    pub s_coef: f64,
    /// Initial value of slack and dual variables of inequalities.
    pub margin: f64,
    /// Max iteration number of the Newton steps.
    pub n_loop: usize,
}

impl Default for PdipmParam
{
    fn default() -> Self
    {
        PdipmParam {
            eps: 1e-10,
            eps_gap: 1e-13,
            s_coef: 0.99,
            margin: 1.,
            n_loop: 256,
        }
    }
}

impl From<&QpParam> for PdipmParam
{
    fn from(par: &QpParam) -> Self
    {
        PdipmParam {
            eps: par.ipm_eps,
            eps_gap: par.ipm_eps_gap,
            n_loop: par.ipm_n_loop,
            ..Default::default()
        }
    }
}

//

/// Dense QP backend by the primal-dual interior-point method.
///
/// Rank deficient \\(P\\) is tolerated as long as the inequalities bound every direction.
#[derive(Debug, Clone)]
pub struct Pdipm
{
    par: PdipmParam,
}

struct Step
{
    dx: DVector<f64>,
    ds: DVector<f64>,
    dz: DVector<f64>,
    dy: DVector<f64>,
}

// largest step keeping v + a * dv nonnegative
fn max_step(v: &DVector<f64>, dv: &DVector<f64>) -> f64
{
    v.iter().zip(dv.iter())
     .filter(|(_, d)| **d < 0.)
     .map(|(v, d)| -v / d)
     .fold(f64::INFINITY, f64::min)
}

impl Pdipm
{
    /// Creates an instance.
    pub fn new(par: PdipmParam) -> Self
    {
        Pdipm {
            par,
        }
    }

    fn converged(&self, prob: &ProbQP, r_d: &DVector<f64>, r_p: &DVector<f64>, r_i: &DVector<f64>,
                 s: &DVector<f64>, z: &DVector<f64>) -> bool
    {
        let eps = self.par.eps;
        let eps_gap = self.par.eps_gap;

        r_d.iter().zip(prob.vec_q.iter()).all(|(r, q)| r.abs() <= eps * (1. + q.abs()))
        && (r_p.amax() <= eps) && (r_i.amax() <= eps)
        && s.iter().zip(z.iter()).all(|(s, z)| s * z <= eps_gap * z.max(1.))
    }
}

impl QpSolver for Pdipm
{
    fn solve_qp(&self, prob: &ProbQP) -> Result<DVector<f64>, QpError>
    {
        let par = &self.par;
        let (n, m, p) = prob.dim()?;

        let mut x = DVector::zeros(n);
        let mut y = DVector::zeros(p);
        let mut s = DVector::from_element(m, par.margin);
        let mut z = DVector::from_element(m, par.margin);

        let mut cnt = 0;
        loop {
            let r_d = prob.sym_p * &x + prob.vec_q + prob.mat_g.tr_mul(&z) + prob.mat_a.tr_mul(&y);
            let r_p = prob.mat_a * &x - prob.vec_b;
            let r_i = prob.mat_g * &x + &s - prob.vec_h;
            let gap = s.dot(&z);

            log::trace!("loop {}: |r_d| {:.3e}, |r_p| {:.3e}, |r_i| {:.3e}, gap {:.3e}",
                        cnt, r_d.amax(), r_p.amax(), r_i.amax(), gap);

            if self.converged(prob, &r_d, &r_p, &r_i, &s, &z) {
                break;
            }
            if cnt >= par.n_loop {
                return Err(QpError::SolverError("iteration: not converged".into()));
            }
            cnt += 1;

            // ----- reduced KKT matrix

            let w = z.component_div(&s);
            let wg = DMatrix::from_fn(m, n, |r, c| w[r] * prob.mat_g[(r, c)]);

            let mut kkt = DMatrix::zeros(n + p, n + p);
            kkt.view_mut((0, 0), (n, n)).copy_from(&(prob.sym_p + prob.mat_g.tr_mul(&wg)));
            kkt.view_mut((0, n), (n, p)).copy_from(&prob.mat_a.transpose());
            kkt.view_mut((n, 0), (p, n)).copy_from(prob.mat_a);
            let lu = kkt.lu();

            // Z ds + S dz = r_c
            let newton = |r_c: &DVector<f64>| -> Result<Step, QpError> {
                let t = (r_c + z.component_mul(&r_i)).component_div(&s);

                let mut rhs = DVector::zeros(n + p);
                rhs.rows_mut(0, n).copy_from(&(-&r_d - prob.mat_g.tr_mul(&t)));
                rhs.rows_mut(n, p).copy_from(&(-&r_p));

                let d = lu.solve(&rhs)
                          .ok_or_else(|| QpError::SolverError("KKT: singular".into()))?;
                let dx = d.rows(0, n).into_owned();
                let dy = d.rows(n, p).into_owned();
                let dz = &wg * &dx + t;
                let ds = -&r_i - prob.mat_g * &dx;

                Ok(Step {dx, ds, dz, dy})
            };

            // ----- predictor

            let sz = s.component_mul(&z);
            let aff = newton(&(-&sz))?;

            let sigma = if m > 0 {
                let a_aff = max_step(&s, &aff.ds).min(max_step(&z, &aff.dz)).min(1.);
                let mu = gap / m as f64;
                let mu_aff = (&s + &aff.ds * a_aff).dot(&(&z + &aff.dz * a_aff)) / m as f64;
                (mu_aff / mu).powi(3).min(1.)
            }
            else {
                0.
            };

            // ----- corrector

            let target = if m > 0 {sigma * gap / m as f64} else {0.};
            let r_c = (-&sz - aff.ds.component_mul(&aff.dz)).add_scalar(target);
            let st = newton(&r_c)?;

            let alpha = (par.s_coef * max_step(&s, &st.ds).min(max_step(&z, &st.dz))).min(1.);
            if !(alpha > f64::EPSILON) {
                return Err(QpError::SolverError("step: too small".into()));
            }

            x += &st.dx * alpha;
            s += &st.ds * alpha;
            z += &st.dz * alpha;
            y += &st.dy * alpha;
        }

        log::trace!("converged in {} loops", cnt);

        Ok(x)
    }
}

//

#[test]
fn test_pdipm_qp1()
{
    use float_eq::assert_float_eq;

    // (1/2)(x - a)^2 + const
    let sym_p = DMatrix::<f64>::identity(2, 2);
    let vec_q = DVector::from_column_slice(&[-(-1.), -(-2.)]);

    // 1 - x0/b0 - x1/b1 <= 0
    let mat_g = DMatrix::from_row_slice(1, 2, &[-1. / 2., -1. / 3.]);
    let vec_h = DVector::from_column_slice(&[-1.]);

    let mat_a = DMatrix::<f64>::zeros(0, 2);
    let vec_b = DVector::<f64>::zeros(0);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };
    let x = Pdipm::new(PdipmParam::default()).solve_qp(&prob).unwrap();

    assert_float_eq!(x.as_slice(), [2., 0.].as_ref(), abs_all <= 1e-8);
}

#[test]
fn test_pdipm_unconstrained()
{
    use float_eq::assert_float_eq;

    let sym_p = DMatrix::from_row_slice(2, 2, &[2., 0., 0., 4.]);
    let vec_q = DVector::from_column_slice(&[-2., -4.]);
    let mat_g = DMatrix::<f64>::zeros(0, 2);
    let vec_h = DVector::<f64>::zeros(0);
    let mat_a = DMatrix::<f64>::zeros(0, 2);
    let vec_b = DVector::<f64>::zeros(0);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };
    let x = Pdipm::new(PdipmParam::default()).solve_qp(&prob).unwrap();

    assert_float_eq!(x.as_slice(), [1., 1.].as_ref(), abs_all <= 1e-8);
}

#[test]
fn test_pdipm_degenerate_vertex()
{
    // optimum at a vertex where every multiplier vanishes
    let sym_p = DMatrix::<f64>::identity(2, 2) * 2.;
    let vec_q = DVector::from_column_slice(&[-2., 0.]);
    let mat_g = DMatrix::from_row_slice(4, 2, &[
        -1.,  0.,
         0., -1.,
         1.,  0.,
         0.,  1.,
    ]);
    let vec_h = DVector::from_column_slice(&[0., 0., 1., 1.]);
    let mat_a = DMatrix::from_element(1, 2, 1.);
    let vec_b = DVector::from_element(1, 1.);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };
    let x = Pdipm::new(PdipmParam::default()).solve_qp(&prob).unwrap();

    assert!((x[0] - 1.).abs() <= 1e-6, "{:?}", x);
    assert!(x[1].abs() <= 1e-6, "{:?}", x);
}

#[test]
fn test_pdipm_large_linear_term()
{
    // an endmember barely used before gets a huge sparsity penalty
    let sym_p = DMatrix::<f64>::identity(3, 3) * 2.;
    let vec_q = DVector::from_column_slice(&[-1., -1., 5e9]);
    let mut mat_g = DMatrix::zeros(6, 3);
    let mut vec_h = DVector::zeros(6);
    for j in 0 .. 3 {
        mat_g[(j, j)] = -1.;
        mat_g[(3 + j, j)] = 1.;
        vec_h[3 + j] = 1.;
    }
    let mat_a = DMatrix::from_element(1, 3, 1.);
    let vec_b = DVector::from_element(1, 1.);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };
    let x = Pdipm::new(PdipmParam::default()).solve_qp(&prob).unwrap();

    assert!((x[0] - 0.5).abs() <= 1e-8, "{:?}", x);
    assert!((x[1] - 0.5).abs() <= 1e-8, "{:?}", x);
    // below the default pruning threshold
    assert!(x[2].abs() < 1e-9, "{:?}", x);
}
