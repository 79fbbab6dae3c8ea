use float_eq::assert_float_eq;
use nalgebra::DMatrix;
use spice::prelude::*;
use spice::qp::{Pdipm, PdipmParam};
use spice::unmix::unmix;

const BASIS: [[f64; 3]; 2] = [
    [0.9, 0.5, 0.1],
    [0.1, 0.4, 0.8],
];

/// 3 bands, 6 observations mixed from two known materials plus small noise.
fn two_materials() -> DMatrix<f64>
{
    let w = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
    let noise = [
        [ 0.002, -0.001,  0.003],
        [-0.003,  0.002,  0.001],
        [ 0.001,  0.003, -0.002],
        [-0.002, -0.001,  0.002],
        [ 0.003,  0.001, -0.001],
        [-0.001, -0.002,  0.003],
    ];

    DMatrix::from_fn(3, 6, |r, c| {
        w[c] * BASIS[0][r] + (1. - w[c]) * BASIS[1][r] + noise[c][r]
    })
}

/// `n` noise-free observations evenly spread between the two materials.
fn segment(n: usize) -> DMatrix<f64>
{
    DMatrix::from_fn(3, n, |r, c| {
        let w = c as f64 / (n - 1) as f64;
        w * BASIS[0][r] + (1. - w) * BASIS[1][r]
    })
}

fn check_simplex(p: &DMatrix<f64>, tol: f64)
{
    assert!(p.iter().all(|v| *v >= 0.));
    for row in p.row_iter() {
        assert_float_eq!(row.sum(), 1., abs <= tol);
    }
}

fn mse(x: &DMatrix<f64>, e: &DMatrix<f64>, p: &DMatrix<f64>) -> f64
{
    (x - e * p.transpose()).norm_squared() / (x.nrows() * x.ncols()) as f64
}

/// Distance from `b` to the convex hull of the columns of `e`.
fn hull_distance(e: &DMatrix<f64>, b: &[f64; 3]) -> f64
{
    let m = e.ncols();
    let b = DMatrix::from_column_slice(3, 1, b);
    let p = unmix(&b, e, 0., &DMatrix::from_element(1, m, 1. / m as f64),
                  &Pdipm::new(PdipmParam::default())).unwrap();

    (b - e * p.transpose()).norm()
}

//

#[test]
fn test_default_settings()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let x = segment(100);

    for seed in [0, 1, 2] {
        let par = SpiceParam::default().par(|p| {
            p.m = 5;
            p.random_state = Some(seed);
            p.iteration_cap = 100;
        });
        let (e, p) = spice(&x, &par).unwrap();

        let m = e.ncols();
        assert!(m >= 2 && m <= 5, "seed {}: {} endmembers", seed, m);
        assert_eq!(e.shape(), (3, m));
        assert_eq!(p.shape(), (100, m));
        check_simplex(&p, 1e-8);
    }
}

#[test]
fn test_two_materials()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let x = two_materials();

    let s = Spice::new().par(|p| {
        p.m = 5;
        p.gamma = 0.;
        p.change_thresh = 1e-12;
        p.iteration_cap = 2000;
        p.random_state = Some(7);
    });
    let rslt = s.run(&x).unwrap();

    let m = rslt.endmembers.ncols();
    assert!(m >= 2 && m <= 5);
    assert_eq!(rslt.endmembers.shape(), (3, m));
    assert_eq!(rslt.proportions.shape(), (6, m));
    check_simplex(&rslt.proportions, 1e-8);

    // noise has a mean square of about 4e-6
    let err = mse(&x, &rslt.endmembers, &rslt.proportions);
    assert!(err < 4e-5, "mse {}", err);

    for b in BASIS.iter() {
        let dist = hull_distance(&rslt.endmembers, b);
        assert!(dist < 0.05, "basis {:?} at {}", b, dist);
    }
}

#[test]
fn test_sparsity_prunes()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let x = segment(60);

    let s = Spice::new().par(|p| {
        p.m = 5;
        p.gamma = 1.;
        p.change_thresh = 1e-9;
        p.iteration_cap = 300;
        p.random_state = Some(7);
        p.produce_display = false;
    });
    let rslt = s.run(&x).unwrap();

    let m = rslt.endmembers.ncols();
    assert!(m >= 2 && m < 5, "{} endmembers", m);
    assert!(rslt.trace.iter().any(|it| !it.removed.is_empty()));
    check_simplex(&rslt.proportions, 1e-8);

    let err = mse(&x, &rslt.endmembers, &rslt.proportions);
    assert!(err < 1e-3, "mse {}", err);

    for b in BASIS.iter() {
        let dist = hull_distance(&rslt.endmembers, b);
        assert!(dist < 0.1, "basis {:?} at {}", b, dist);
    }
}

#[test]
fn test_row_sums()
{
    let x = two_materials();

    for gamma in [0., 0.01, 0.1] {
        let s = Spice::new().par(|p| {
            p.m = 4;
            p.gamma = gamma;
            p.iteration_cap = 20;
            p.random_state = Some(1);
            p.produce_display = false;
        });
        let rslt = s.run(&x).unwrap();

        check_simplex(&rslt.proportions, 1e-8);
    }
}

#[test]
fn test_trace_properties()
{
    let _ = env_logger::builder().is_test(true).try_init();

    let x = two_materials();

    let s = Spice::new().par(|p| {
        p.m = 5;
        p.gamma = 0.01;
        p.iteration_cap = 50;
        p.random_state = Some(3);
        p.produce_display = false;
    });
    let rslt = s.run(&x).unwrap();

    assert_eq!(rslt.n_iterations, rslt.trace.len());
    assert!(rslt.n_iterations <= 50);
    assert_eq!(rslt.init_em.ncols(), 5);

    // endmember count never grows
    let mut m_prev = 5;
    for (i, it) in rslt.trace.iter().enumerate() {
        assert_eq!(it.iteration, i + 1);
        assert_eq!(it.m, m_prev - it.removed.len());
        assert!(it.m <= m_prev);
        m_prev = it.m;
    }
    assert_eq!(m_prev, rslt.endmembers.ncols());

    let last = rslt.trace.last().unwrap();
    if rslt.converged {
        assert!(last.change <= 1e-4);
    }
    else {
        assert_eq!(rslt.n_iterations, 50);
    }
    assert_eq!(last.objective, rslt.objective);

    check_simplex(&rslt.proportions, 1e-8);
}

#[test]
fn test_seeded_runs_identical()
{
    let x = two_materials();

    let par = SpiceParam::default().par(|p| {
        p.m = 4;
        p.gamma = 0.;
        p.iteration_cap = 20;
        p.random_state = Some(11);
        p.produce_display = false;
    });

    let (e1, p1) = spice(&x, &par).unwrap();
    let (e2, p2) = spice(&x, &par).unwrap();

    assert_eq!(e1, e2);
    assert_eq!(p1, p2);
}

#[test]
fn test_rescale()
{
    let x = two_materials();
    let k = 4.;

    let s = Spice::new().par(|p| {
        p.m = 4;
        p.gamma = 0.;
        p.iteration_cap = 30;
        p.random_state = Some(5);
        p.produce_display = false;
    });

    let r1 = s.run(&x).unwrap();
    let r2 = s.run(&(&x * k)).unwrap();

    assert_eq!(r1.endmembers.shape(), r2.endmembers.shape());
    assert_float_eq!((&r1.endmembers * k).as_slice(), r2.endmembers.as_slice(), abs_all <= 1e-9);
    assert_float_eq!(r1.proportions.as_slice(), r2.proportions.as_slice(), abs_all <= 1e-9);
    assert_float_eq!((&r1.init_em * k).as_slice(), r2.init_em.as_slice(), abs_all <= 1e-9);
}

#[test]
fn test_init_em()
{
    let x = two_materials();

    let init_em = DMatrix::from_column_slice(3, 3, &[
        0.8, 0.5, 0.2,
        0.2, 0.4, 0.7,
        0.6, 0.6, 0.6,
    ]);

    let s = Spice::new().par(|p| {
        p.m = 20; // superseded by init_em
        p.init_em = Some(init_em.clone());
        p.gamma = 0.;
        p.iteration_cap = 1;
        p.produce_display = false;
    });
    let rslt = s.run(&x).unwrap();

    assert_eq!(rslt.init_em, init_em);

    // the first abundances are solved against init_em as given, on prescaled data
    let scaled = &x / x.max();
    let p = unmix(&scaled, &init_em, 0., &DMatrix::from_element(6, 3, 1. / 3.),
                  &Pdipm::new(PdipmParam::default())).unwrap();

    let keep: Vec<usize> = (0 .. 3).filter(|j| !rslt.trace[0].removed.contains(j)).collect();
    let p = p.select_columns(keep.iter());

    assert_eq!(rslt.proportions.shape(), p.shape());
    assert_float_eq!(rslt.proportions.as_slice(), p.as_slice(), abs_all <= 1e-12);
}

#[test]
fn test_prune_below_two()
{
    let x = two_materials();

    let s = Spice::new().par(|p| {
        p.init_em = Some(x.columns(0, 2).into_owned());
        p.endmember_prune_threshold = 10.;
    });

    assert!(matches!(s.run(&x), Err(SpiceError::InvalidConfiguration(_))));
}

#[test]
fn test_invalid_input()
{
    let x = DMatrix::from_column_slice(3, 1, &[0.1, 0.2, 0.3]);

    // 1 observation cannot seed 20 endmembers
    assert!(matches!(Spice::new().run(&x), Err(SpiceError::InvalidInput(_))));

    let x = two_materials();

    let s = Spice::new().par(|p| {
        p.init_em = Some(DMatrix::from_element(4, 2, 0.5));
    });
    assert!(matches!(s.run(&x), Err(SpiceError::InvalidInput(_))));

    let s = Spice::new().par(|p| p.m = 3);
    assert!(matches!(s.run(&DMatrix::zeros(3, 6)), Err(SpiceError::InvalidInput(_))));
}

#[test]
fn test_invalid_configuration()
{
    let x = two_materials();

    let s = Spice::new().par(|p| {
        p.m = 3;
        p.u = 1.;
    });
    assert!(matches!(s.run(&x), Err(SpiceError::InvalidConfiguration(_))));

    let s = Spice::new().par(|p| {
        p.m = 3;
        p.endmember_prune_threshold = 0.;
    });
    assert!(matches!(s.run(&x), Err(SpiceError::InvalidConfiguration(_))));

    let mut par = SpiceParam::default();
    par.merge([("M", 1.)]).unwrap();
    assert!(matches!(spice(&x, &par), Err(SpiceError::InvalidConfiguration(_))));
}
