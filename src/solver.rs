use nalgebra::DMatrix;
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use crate::endmember::update_endmembers;
use crate::param::SpiceParam;
use crate::prune::{lambda_for, objective, prune_and_check};
use crate::spice_error::{SpiceError, Result};
use crate::unmix::unmix;

/// Diagnostics of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterReport
{
    /// Iteration number, starting from 1.
    pub iteration: usize,
    /// Absolute change of the objective value from the previous iteration.
    pub change: f64,
    /// Least among the per-endmember maximum proportions.
    pub minmax_p: f64,
    /// Number of endmembers after this iteration.
    pub m: usize,
    /// Column indices removed in this iteration, numbered as before the removal.
    pub removed: Vec<usize>,
    /// Objective value.
    pub objective: f64,
}

/// Result of a SPICE run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpiceResult
{
    /// Endmembers, `d` x `m'`, in the units of the input.
    pub endmembers: DMatrix<f64>,
    /// Proportions, `n` x `m'`.
    pub proportions: DMatrix<f64>,
    /// Endmembers the run started from: `init_em` as supplied, or the sampled observations.
    pub init_em: DMatrix<f64>,
    /// Number of iterations performed.
    pub n_iterations: usize,
    /// `true` if stopped by the change threshold rather than the iteration cap.
    pub converged: bool,
    /// Final objective value, evaluated on prescaled data if prescaling is enabled.
    pub objective: f64,
    /// Per-iteration diagnostics.
    pub trace: Vec<IterReport>,
}

//

/// SPICE: sparsity promoting iterated constrained endmembers.
///
/// Alternates the abundance QPs and the endmember update,
/// pruning endmembers that no observation uses, until the objective settles.
pub struct Spice
{
    /// Parameters, see [`SpiceParam`].
    pub par: SpiceParam,
}

impl Default for Spice
{
    fn default() -> Self
    {
        Spice::new()
    }
}

impl Spice
{
    /// Creates an instance with default parameters.
    pub fn new() -> Self
    {
        Spice {
            par: SpiceParam::default(),
        }
    }

    /// Creates an instance with given parameters.
    pub fn with_par(par: SpiceParam) -> Self
    {
        Spice {
            par,
        }
    }

    /// Changes parameters by a function.
    ///
    /// * `f` takes a mutable reference of the parameters.
    pub fn par<F>(mut self, f: F) -> Self
    where F: FnOnce(&mut SpiceParam)
    {
        f(&mut self.par);
        self
    }

    /// Finds endmembers and unmixes `x`.
    ///
    /// Returns a [`SpiceResult`] or the first error encountered; the run is aborted on any error.
    /// * `x` is the `d` x `n` observation matrix, one observation per column.
    pub fn run(&self, x: &DMatrix<f64>) -> Result<SpiceResult>
    {
        let par = &self.par;
        par.validate()?;

        let (d, n) = x.shape();
        if d == 0 || n == 0 {
            return Err(SpiceError::InvalidInput(format!("observations: size {:?} is empty", (d, n))));
        }
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SpiceError::InvalidInput("observations: non-finite entries".into()));
        }

        match &par.init_em {
            Some(em) => {
                if em.nrows() != d {
                    return Err(SpiceError::InvalidInput(
                        format!("init_em: {} rows must be {}", em.nrows(), d)
                    ));
                }
            },
            None => {
                if n < par.m {
                    return Err(SpiceError::InvalidInput(
                        format!("observations: {} columns cannot seed {} endmembers", n, par.m)
                    ));
                }
            },
        }

        // ----- prescale

        let scale = if par.prescale {
            let mx = x.max();
            if !(mx > 0.) {
                return Err(SpiceError::InvalidInput(format!("observations: maximum {} cannot prescale", mx)));
            }
            mx
        }
        else {
            1.
        };
        let scaled;
        let x = if par.prescale {
            scaled = x / scale;
            &scaled
        }
        else {
            x
        };

        // ----- initial endmembers

        // a supplied init_em is taken as is, even when prescaling
        let (mut e, init_em) = match &par.init_em {
            Some(em) => (em.clone(), em.clone()),
            None => {
                let seed = par.random_state.unwrap_or_else(|| rand::thread_rng().gen());
                let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
                let indices = rand::seq::index::sample(&mut rng, n, par.m).into_vec();
                log::debug!("initial endmembers from observations {:?}", indices);
                let e = x.select_columns(indices.iter());
                let init_em = &e * scale;
                (e, init_em)
            },
        };
        let mut m = e.ncols();

        let mut p = DMatrix::from_element(n, m, 1. / m as f64);
        let mut lambda = lambda_for(n, par.u, m)?;

        let solver = par.qp_solver.solver(&par.qp);

        log::debug!("SPICE start: {} bands, {} observations, {} endmembers, {} QP backend", d, n, m, par.qp_solver);

        // ----- main loop

        let mut rss_reg = f64::INFINITY;
        let mut change = f64::INFINITY;
        let mut iteration = 0;
        let mut trace = Vec::new();

        while (change > par.change_thresh) && (iteration < par.iteration_cap) {
            iteration += 1;

            // given endmembers, minimize proportions
            p = unmix(x, &e, par.gamma, &p, solver.as_ref())?;

            // given proportions, minimize endmembers
            e = update_endmembers(x, &p, lambda)?;

            let pruning = prune_and_check(e, p, lambda, par.endmember_prune_threshold, par.u)?;
            let minmax_p = pruning.minmax_p;
            let removed = pruning.removed;
            e = pruning.endmembers;
            p = pruning.proportions;
            lambda = pruning.lambda;
            m = e.ncols();

            let obj = objective(x, &e, &p, par.u, par.gamma)?;
            change = (obj.value - rss_reg).abs();
            rss_reg = obj.value;

            if par.produce_display {
                log::info!("iteration {}: change {:.6e}, min of max proportions {:.6e}, {} endmembers",
                           iteration, change, minmax_p, m);
            }
            else {
                log::trace!("iteration {}: change {:.6e}, min of max proportions {:.6e}, {} endmembers",
                            iteration, change, minmax_p, m);
            }

            trace.push(IterReport {
                iteration,
                change,
                minmax_p,
                m,
                removed,
                objective: obj.value,
            });
        }

        let converged = change <= par.change_thresh;
        if !converged {
            log::warn!("iteration cap {} reached, last change {:.3e}", par.iteration_cap, change);
        }

        // ----- rescale to the input units

        if par.prescale {
            e *= scale;
        }

        Ok(SpiceResult {
            endmembers: e,
            proportions: p,
            init_em,
            n_iterations: iteration,
            converged,
            objective: rss_reg,
            trace,
        })
    }
}

/// Runs SPICE on `x` with parameters `par`.
///
/// Returns a tuple of the `d` x `m'` endmembers and the `n` x `m'` proportions.
pub fn spice(x: &DMatrix<f64>, par: &SpiceParam) -> Result<(DMatrix<f64>, DMatrix<f64>)>
{
    let rslt = Spice::with_par(par.clone()).run(x)?;

    Ok((rslt.endmembers, rslt.proportions))
}
