use nalgebra::DVector;
use totsu::MatBuild;
use totsu_core::solver::{Solver, SolverError};
use totsu_core::{FloatGeneric, MatType};
use crate::spice_error::QpError;
use super::{ProbQP, QpParam, QpSolver};

type La = FloatGeneric<f64>;

type AMatBuild = MatBuild<La>;
type AProbQP = totsu::ProbQP<La>;
type ASolver = Solver<La>;

//

impl From<SolverError> for QpError
{
    fn from(e: SolverError) -> Self
    {
        match e {
            SolverError::Infeasible => QpError::Infeasible,
            _ => QpError::SolverError(format!("{}", e)),
        }
    }
}

//

/// QP backend built on the first-order conic solver of `totsu`.
///
/// Each call converts the problem into [`totsu::ProbQP`] and runs a fresh [`totsu_core::solver::Solver`],
/// so one instance serves any number of threads.
#[derive(Debug, Clone)]
pub struct TotsuQp
{
    par: QpParam,
}

impl TotsuQp
{
    /// Creates an instance with per-call parameters `par`.
    pub fn new(par: &QpParam) -> Self
    {
        TotsuQp {
            par: par.clone(),
        }
    }
}

impl QpSolver for TotsuQp
{
    fn solve_qp(&self, prob: &ProbQP) -> Result<DVector<f64>, QpError>
    {
        let (n, m, p) = prob.dim()?;

        // upper triangle of the symmetric part
        let sym_p = AMatBuild::new(MatType::SymPack(n))
                    .by_fn(|r, c| 0.5 * (prob.sym_p[(r, c)] + prob.sym_p[(c, r)]));
        let vec_q = AMatBuild::new(MatType::General(n, 1))
                    .by_fn(|r, _| prob.vec_q[r]);
        let mat_g = AMatBuild::new(MatType::General(m, n))
                    .by_fn(|r, c| prob.mat_g[(r, c)]);
        let vec_h = AMatBuild::new(MatType::General(m, 1))
                    .by_fn(|r, _| prob.vec_h[r]);
        let mat_a = AMatBuild::new(MatType::General(p, n))
                    .by_fn(|r, c| prob.mat_a[(r, c)]);
        let vec_b = AMatBuild::new(MatType::General(p, 1))
                    .by_fn(|r, _| prob.vec_b[r]);

        let par = &self.par;
        let s = ASolver::new().par(|sp| {
            sp.max_iter = par.max_iter;
            sp.eps_acc = par.eps_acc;
            sp.eps_inf = par.eps_inf;
            sp.eps_zero = par.eps_zero;
            sp.log_period = par.log_period;
        });
        let mut qp = AProbQP::new(sym_p, vec_q, mat_g, vec_h, mat_a, vec_b, par.eps_zero);
        let rslt = s.solve(qp.problem())?;

        // trailing element is the epigraph variable
        Ok(DVector::from_column_slice(&rslt.0[0 .. n]))
    }
}

//

#[test]
fn test_totsu_qp1()
{
    use float_eq::assert_float_eq;
    use nalgebra::DMatrix;

    let _ = env_logger::builder().is_test(true).try_init();

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
    let x = TotsuQp::new(&QpParam::default()).solve_qp(&prob).unwrap();

    assert_float_eq!(x.as_slice(), [2., 0.].as_ref(), abs_all <= 1e-3);
}
