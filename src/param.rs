//! SPICE parameters.

use nalgebra::DMatrix;
use num_traits::Num;
use crate::qp::{QpBackend, QpParam};
use crate::spice_error::{SpiceError, Result};

/// SPICE parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SpiceParam
{
    /// Trade-off weight between the RSS and V terms, in `(0, 1)`.
    pub u: f64,
    /// Strength of the sparsity promoting term.
    pub gamma: f64,
    /// Initial number of endmembers, ignored when `init_em` is given.
    pub m: usize,
    /// Endmembers whose maximum proportion falls below this are pruned.
    pub endmember_prune_threshold: f64,
    /// Stops when the change of the objective value is not above this.
    pub change_thresh: f64,
    /// Max iteration number.
    pub iteration_cap: usize,
    /// Emits per-iteration progress at info level instead of trace level.
    pub produce_display: bool,
    /// Initial endmembers (columns), `None` to sample `m` observations at random.
    pub init_em: Option<DMatrix<f64>>,
    /// QP backend of the abundance solver.
    pub qp_solver: QpBackend,
    /// Divides observations by their maximum during the run.
    pub prescale: bool,
    /// Seed of the random endmember initialization. `None` means a fresh seed each run.
    pub random_state: Option<u64>,
    /// Options passed to the QP backend on each call.
    pub qp: QpParam,
}

impl Default for SpiceParam
{
    fn default() -> Self
    {
        SpiceParam {
            u: 0.001,
            gamma: 5.,
            m: 20,
            endmember_prune_threshold: 1e-9,
            change_thresh: 1e-4,
            iteration_cap: 5000,
            produce_display: true,
            init_em: None,
            qp_solver: QpBackend::Primary,
            prescale: true,
            random_state: None,
            qp: QpParam::default(),
        }
    }
}

impl SpiceParam
{
    /// Changes parameters by a function.
    ///
    /// * `f` takes a mutable reference of the parameters.
    pub fn par<F>(mut self, f: F) -> Self
    where F: FnOnce(&mut SpiceParam)
    {
        f(&mut self);
        self
    }

    /// Overrides parameters by a flat set of named scalars.
    ///
    /// Names not listed below are ignored; parameters not named keep their values.
    /// `u`, `gamma`, `M`, `endmemberPruneThreshold`, `changeThresh`, `iterationCap`,
    /// `produceDisplay`, `prescale` and `randomState` are recognized.
    /// Counts and seeds must be non-negative integers.
    pub fn merge<'a, I>(&mut self, options: I) -> Result<()>
    where I: IntoIterator<Item=(&'a str, f64)>
    {
        for (name, v) in options {
            match name {
                "u" => self.u = v,
                "gamma" => self.gamma = v,
                "M" => self.m = count(name, v)?,
                "endmemberPruneThreshold" => self.endmember_prune_threshold = v,
                "changeThresh" => self.change_thresh = v,
                "iterationCap" => self.iteration_cap = count(name, v)?,
                "produceDisplay" => self.produce_display = v != 0.,
                "prescale" => self.prescale = v != 0.,
                "randomState" => self.random_state = Some(count(name, v)? as u64),
                _ => log::debug!("ignored unknown parameter '{}'", name),
            }
        }
        Ok(())
    }

    /// Validates the parameters.
    pub fn validate(&self) -> Result<()>
    {
        if !(self.u > 0. && self.u < 1.) {
            return Err(invalid("u", "must be in (0, 1)"));
        }
        if !(self.gamma >= 0.) || !self.gamma.is_finite() {
            return Err(invalid("gamma", "must be a finite non-negative value"));
        }
        if !(self.endmember_prune_threshold > 0.) {
            return Err(invalid("endmember_prune_threshold", "must be positive"));
        }
        if !(self.change_thresh > 0.) {
            return Err(invalid("change_thresh", "must be positive"));
        }
        if self.iteration_cap == 0 {
            return Err(invalid("iteration_cap", "must be greater than 0"));
        }

        let m = match &self.init_em {
            Some(em) => em.ncols(),
            None => self.m,
        };
        if m < 2 {
            return Err(invalid("M", "at least 2 endmembers are required"));
        }

        Ok(())
    }
}

fn invalid(parameter: &str, message: &str) -> SpiceError
{
    SpiceError::InvalidConfiguration(format!("{}: {}", parameter, message))
}

fn count(name: &str, v: f64) -> Result<usize>
{
    if v >= 0. && v.fract() == 0. && v <= usize::MAX as f64 {
        Ok(v as usize)
    }
    else {
        Err(invalid(name, "must be a non-negative integer"))
    }
}

//

fn num_by_env<N: Num + std::fmt::Display>(e: &str) -> Option<N>
{
    if let Some(v) = std::env::var(e).ok()
                     .and_then(|s| {N::from_str_radix(s.trim(), 10).ok()}) {
        log::info!("{}: {}", e, v);
        Some(v)
    }
    else {
        None
    }
}

/// Overrides parameters by environment variables.
///
/// `SPICE_U`, `SPICE_GAMMA`, `SPICE_M`, `SPICE_PRUNE_THRESH`, `SPICE_CHANGE_THRESH`,
/// `SPICE_ITER_CAP`, `SPICE_DISPLAY` (0 or 1), `SPICE_SEED` and `SPICE_QP_SOLVER` are looked up.
/// Unparsable values are ignored.
pub fn set_par_by_env(p: &mut SpiceParam)
{
    p.u = num_by_env("SPICE_U").unwrap_or(p.u);
    p.gamma = num_by_env("SPICE_GAMMA").unwrap_or(p.gamma);
    p.m = num_by_env("SPICE_M").unwrap_or(p.m);
    p.endmember_prune_threshold = num_by_env("SPICE_PRUNE_THRESH").unwrap_or(p.endmember_prune_threshold);
    p.change_thresh = num_by_env("SPICE_CHANGE_THRESH").unwrap_or(p.change_thresh);
    p.iteration_cap = num_by_env("SPICE_ITER_CAP").unwrap_or(p.iteration_cap);
    p.produce_display = num_by_env::<u8>("SPICE_DISPLAY").map(|v| v != 0).unwrap_or(p.produce_display);
    p.random_state = num_by_env("SPICE_SEED").or(p.random_state);

    if let Some(b) = std::env::var("SPICE_QP_SOLVER").ok()
                     .and_then(|s| s.parse::<QpBackend>().ok()) {
        log::info!("SPICE_QP_SOLVER: {}", b);
        p.qp_solver = b;
    }
}

//

#[test]
fn test_merge()
{
    let mut p = SpiceParam::default();
    p.merge([("gamma", 0.), ("M", 5.), ("someUnknownField", 42.), ("produceDisplay", 0.)]).unwrap();

    assert_eq!(p.gamma, 0.);
    assert_eq!(p.m, 5);
    assert!(!p.produce_display);
    // untouched
    assert_eq!(p.u, 0.001);
    assert_eq!(p.iteration_cap, 5000);

    assert!(p.merge([("iterationCap", 1.5)]).is_err());
}

#[test]
fn test_validate()
{
    assert!(SpiceParam::default().validate().is_ok());

    for p in [
        SpiceParam::default().par(|p| p.u = 1.),
        SpiceParam::default().par(|p| p.u = 0.),
        SpiceParam::default().par(|p| p.gamma = -1.),
        SpiceParam::default().par(|p| p.m = 1),
        SpiceParam::default().par(|p| p.iteration_cap = 0),
        SpiceParam::default().par(|p| p.endmember_prune_threshold = 0.),
        SpiceParam::default().par(|p| p.change_thresh = 0.),
        SpiceParam::default().par(|p| p.change_thresh = f64::NAN),
        SpiceParam::default().par(|p| p.init_em = Some(DMatrix::zeros(3, 1))),
    ] {
        assert!(matches!(p.validate(), Err(SpiceError::InvalidConfiguration(_))));
    }

    // init_em decides the count
    let p = SpiceParam::default().par(|p| {
        p.m = 1;
        p.init_em = Some(DMatrix::zeros(3, 2));
    });
    assert!(p.validate().is_ok());
}

#[test]
fn test_set_par_by_env()
{
    let _ = env_logger::builder().is_test(true).try_init();

    std::env::set_var("SPICE_GAMMA", "0.5");
    std::env::set_var("SPICE_M", " 7 ");
    std::env::set_var("SPICE_SEED", "42");
    std::env::set_var("SPICE_ITER_CAP", "not a number");
    std::env::set_var("SPICE_QP_SOLVER", "totsu");

    let mut p = SpiceParam::default();
    set_par_by_env(&mut p);

    assert_eq!(p.gamma, 0.5);
    assert_eq!(p.m, 7);
    assert_eq!(p.random_state, Some(42));
    assert_eq!(p.iteration_cap, 5000);
    assert_eq!(p.qp_solver, QpBackend::Secondary);

    for e in ["SPICE_GAMMA", "SPICE_M", "SPICE_SEED", "SPICE_ITER_CAP", "SPICE_QP_SOLVER"] {
        std::env::remove_var(e);
    }
}
