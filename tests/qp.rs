use float_eq::assert_float_eq;
use nalgebra::{DMatrix, DVector};
use spice::qp::*;

fn obj(sym_p: &DMatrix<f64>, vec_q: &DVector<f64>, x: &DVector<f64>) -> f64
{
    0.5 * (x.transpose() * sym_p * x)[(0, 0)] + vec_q.dot(x)
}

fn simplex(m: usize) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>, DVector<f64>)
{
    let mut mat_g = DMatrix::zeros(2 * m, m);
    let mut vec_h = DVector::zeros(2 * m);
    for j in 0 .. m {
        mat_g[(j, j)] = -1.;
        mat_g[(m + j, j)] = 1.;
        vec_h[m + j] = 1.;
    }
    (mat_g, vec_h, DMatrix::from_element(1, m, 1.), DVector::from_element(1, 1.))
}

//

#[test]
fn test_qp1()
{
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

    for backend in [QpBackend::Primary, QpBackend::Secondary] {
        let rslt = backend.solver(&QpParam::default()).solve_qp(&prob).unwrap();
        println!("{}: {:?}", backend, rslt);

        assert_float_eq!(rslt.as_slice(), [2., 0.].as_ref(), abs_all <= 1e-3);
    }
}

#[test]
fn test_simplex_projection()
{
    let _ = env_logger::builder().is_test(true).try_init();

    // min |p - a|^2 on the simplex
    let a = DVector::from_column_slice(&[0.6, 0.5, -0.1]);
    let sym_p = DMatrix::<f64>::identity(3, 3) * 2.;
    let vec_q = &a * -2.;
    let (mat_g, vec_h, mat_a, vec_b) = simplex(3);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };

    let x = QpBackend::Primary.solver(&QpParam::default()).solve_qp(&prob).unwrap();
    assert_float_eq!(x.as_slice(), [0.55, 0.45, 0.].as_ref(), abs_all <= 1e-9);

    let x = QpBackend::Secondary.solver(&QpParam::default()).solve_qp(&prob).unwrap();
    assert_float_eq!(x.as_slice(), [0.55, 0.45, 0.].as_ref(), abs_all <= 1e-3);
}

#[test]
fn test_singular_quadratic()
{
    let _ = env_logger::builder().is_test(true).try_init();

    // more endmembers than bands: 2 E^T E is rank deficient
    let e = DMatrix::from_row_slice(2, 4, &[
        0.9, 0.1, 0.5, 0.3,
        0.2, 0.8, 0.5, 0.6,
    ]);
    let x = DVector::from_column_slice(&[0.4, 0.55]);
    let sym_p = e.tr_mul(&e) * 2.;
    let vec_q = e.tr_mul(&x) * -2.;
    let (mat_g, vec_h, mat_a, vec_b) = simplex(4);

    let prob = ProbQP {
        sym_p: &sym_p, vec_q: &vec_q,
        mat_g: &mat_g, vec_h: &vec_h,
        mat_a: &mat_a, vec_b: &vec_b,
    };

    let x1 = QpBackend::Primary.solver(&QpParam::default()).solve_qp(&prob).unwrap();
    let x2 = QpBackend::Secondary.solver(&QpParam::default()).solve_qp(&prob).unwrap();

    for x in [&x1, &x2] {
        assert_float_eq!(x.sum(), 1., abs <= 1e-3);
        assert!(x.iter().all(|v| *v >= -1e-3 && *v <= 1. + 1e-3));
    }
    // optimum is not unique, its value is
    assert_float_eq!(obj(&sym_p, &vec_q, &x1), obj(&sym_p, &vec_q, &x2), abs <= 1e-3);
}
