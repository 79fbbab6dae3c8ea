/*!
SPICE: Sparsity Promoting Iterated Constrained Endmembers.

<script src="https://polyfill.io/v3/polyfill.min.js?features=es6"></script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>

Given observations \\( X \in \mathbb{R}^{D \times N} \\) (e.g. hyperspectral pixels as columns),
this crate jointly finds endmembers \\( E \in \mathbb{R}^{D \times M} \\)
and proportions \\( P \in \mathbb{R}^{N \times M} \\) with \\( X \approx E P^T \\),
each row of \\(P\\) lying on the probability simplex.

# General usage

1. Set up [`SpiceParam`] (or [`Spice`] with [`Spice::par`]), starting from the defaults.
1. Choose a QP backend by [`qp::QpBackend`]:
   * [`qp::QpBackend::Primary`] -
     a dense primal-dual interior-point method, solving abundances to the accuracy pruning needs.
   * [`qp::QpBackend::Secondary`] -
     the first-order conic solver of `totsu`, cheaper per iteration but only accurate to about `1e-6`.
1. Invoke [`Spice::run`] to get a [`SpiceResult`], or [`spice()`] to get just the matrices.

The algorithm alternates:
1. abundance QPs with fixed endmembers ([`unmix::unmix`]),
1. the closed-form endmember update with fixed abundances ([`endmember::update_endmembers`]),
1. pruning of endmembers no observation uses ([`prune::prune_and_check`]),

until the change of the regularized objective ([`prune::objective`]) falls below the threshold.

# Examples

```no_run
use nalgebra::DMatrix;
use spice::prelude::*;

//env_logger::init(); // Use any logger crate as `spice` uses `log` crate.

// 3 bands, 6 pixels mixed from two materials
let a = [0.9, 0.5, 0.1];
let b = [0.1, 0.4, 0.8];
let w = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
let x = DMatrix::from_fn(3, 6, |r, c| w[c] * a[r] + (1. - w[c]) * b[r]);

let s = Spice::new().par(|p| {
    p.m = 4;
    p.gamma = 0.;
    p.random_state = Some(1);
});
let rslt = s.run(&x).unwrap();

println!("{} endmembers after {} iterations", rslt.endmembers.ncols(), rslt.n_iterations);
```
*/

mod spice_error;

pub use spice_error::*;

//

mod param;

pub use param::*;

//

pub mod qp;
pub mod unmix;
pub mod endmember;
pub mod prune;

//

mod solver;

pub use solver::*;

/// Prelude
pub mod prelude
{
    pub use crate::{Spice, SpiceParam, SpiceResult, SpiceError, spice};
    pub use crate::qp::{QpBackend, QpParam};
}
