//! Built-in tableaux.
//!
//! A small set covering the default configurations and the test suite.
//! Each constructor returns a fresh `Arc` so callers can hand it straight
//! to a kernel or a [`Value::Scheme`](crate::Value::Scheme).

use std::sync::Arc;

use crate::scheme::{AdditiveScheme, Scheme};

/// Forward Euler, order 1.
pub fn forward_euler() -> Arc<Scheme> {
    Arc::new(Scheme::builtin(
        "forward_euler",
        &[vec![0.0]],
        vec![1.0],
        vec![0.0],
        1,
        None,
        false,
    ))
}

/// Heun-Euler 2(1): Heun's method with an embedded Euler solution.
pub fn heun_euler() -> Arc<Scheme> {
    Arc::new(Scheme::builtin(
        "heun_euler",
        &[vec![0.0, 0.0], vec![1.0, 0.0]],
        vec![0.5, 0.5],
        vec![0.0, 1.0],
        2,
        Some((vec![1.0, 0.0], 1)),
        false,
    ))
}

/// Bogacki-Shampine 3(2), FSAL.
pub fn bogacki_shampine() -> Arc<Scheme> {
    Arc::new(Scheme::builtin(
        "bogacki_shampine",
        &[
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.5, 0.0, 0.0, 0.0],
            vec![0.0, 0.75, 0.0, 0.0],
            vec![2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
        ],
        vec![2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
        vec![0.0, 0.5, 0.75, 1.0],
        3,
        Some((vec![7.0 / 24.0, 0.25, 1.0 / 3.0, 0.125], 2)),
        true,
    ))
}

/// Classical fourth-order Runge-Kutta.
pub fn rk4() -> Arc<Scheme> {
    Arc::new(Scheme::builtin(
        "rk4",
        &[
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.5, 0.0, 0.0, 0.0],
            vec![0.0, 0.5, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ],
        vec![1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
        vec![0.0, 0.5, 0.5, 1.0],
        4,
        None,
        false,
    ))
}

/// Dormand-Prince 5(4), FSAL.
pub fn dormand_prince() -> Arc<Scheme> {
    let b = vec![
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
        0.0,
    ];
    let b_hat = vec![
        5179.0 / 57600.0,
        0.0,
        7571.0 / 16695.0,
        393.0 / 640.0,
        -92097.0 / 339200.0,
        187.0 / 2100.0,
        1.0 / 40.0,
    ];
    Arc::new(Scheme::builtin(
        "dormand_prince",
        &[
            vec![0.0; 7],
            vec![1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0, 0.0],
            vec![
                19372.0 / 6561.0,
                -25360.0 / 2187.0,
                64448.0 / 6561.0,
                -212.0 / 729.0,
                0.0,
                0.0,
                0.0,
            ],
            vec![
                9017.0 / 3168.0,
                -355.0 / 33.0,
                46732.0 / 5247.0,
                49.0 / 176.0,
                -5103.0 / 18656.0,
                0.0,
                0.0,
            ],
            b.clone(),
        ],
        b,
        vec![0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0],
        5,
        Some((b_hat, 4)),
        true,
    ))
}

/// Ascher-Ruuth-Spiteri ARS(2,2,2): L-stable second-order IMEX pair with
/// a first-order embedded solution taken from the middle stage.
pub fn ars222() -> Arc<AdditiveScheme> {
    let gamma = 1.0 - std::f64::consts::FRAC_1_SQRT_2;
    let delta = 1.0 - 1.0 / (2.0 * gamma);
    let c = vec![0.0, gamma, 1.0];
    let explicit = Scheme::builtin(
        "ars222_explicit",
        &[
            vec![0.0, 0.0, 0.0],
            vec![gamma, 0.0, 0.0],
            vec![delta, 1.0 - delta, 0.0],
        ],
        vec![delta, 1.0 - delta, 0.0],
        c.clone(),
        2,
        Some((vec![0.0, 1.0, 0.0], 1)),
        false,
    );
    let implicit = Scheme::builtin(
        "ars222_implicit",
        &[
            vec![0.0, 0.0, 0.0],
            vec![0.0, gamma, 0.0],
            vec![0.0, 1.0 - gamma, gamma],
        ],
        vec![0.0, 1.0 - gamma, gamma],
        c,
        2,
        Some((vec![0.0, 1.0, 0.0], 1)),
        false,
    );
    Arc::new(AdditiveScheme::from_checked_parts("ars222", explicit, implicit, gamma))
}
