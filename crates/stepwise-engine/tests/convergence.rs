//! Accuracy and order of the built-in methods through the full solver.

use stepwise_core::tableau;
use stepwise_engine::{EmbeddedLaw, ErrorControl, Method, Solver, SolverConfig, Termination};
use stepwise_modules::Tolerance;
use stepwise_test_utils::{assert_close, Decay, HarmonicOscillator, ProtheroRobinson, VanDerPol};

fn fixed_error(method: Method, h: f64) -> f64 {
    let ode = Decay::new(1.0);
    let mut solver = Solver::new(SolverConfig::fixed(method, h));
    solver.solve(&ode, 0.0, 1.0, &[1.0]).unwrap();
    (solver.final_values()[0] - ode.exact(1.0, 1.0)).abs()
}

fn observed_order(method: impl Fn() -> Method) -> f64 {
    let coarse = fixed_error(method(), 0.1);
    let fine = fixed_error(method(), 0.05);
    (coarse / fine).log2()
}

#[test]
fn fixed_step_orders() {
    let cases: [(fn() -> Method, f64); 5] = [
        (|| Method::ForwardEuler, 1.0),
        (|| Method::ExplicitRk(tableau::heun_euler()), 2.0),
        (|| Method::ExplicitRk(tableau::bogacki_shampine()), 3.0),
        (|| Method::ExplicitRk(tableau::rk4()), 4.0),
        (|| Method::ExplicitRk(tableau::dormand_prince()), 5.0),
    ];
    for (method, expected) in cases {
        let p = observed_order(method);
        assert!(
            (p - expected).abs() < 0.35,
            "{}: observed order {p}, expected {expected}",
            method().name()
        );
    }
}

#[test]
fn every_embedded_law_meets_tolerance() {
    let ode = Decay::new(2.0);
    for law in [
        EmbeddedLaw::Basic,
        EmbeddedLaw::ExplicitPi,
        EmbeddedLaw::ImplicitPredictive,
    ] {
        let config = SolverConfig::adaptive(
            Method::ExplicitRk(tableau::dormand_prince()),
            ErrorControl::Embedded(law),
            Tolerance::scalar(1e-9, 1e-7),
        );
        let mut solver = Solver::new(config);
        assert_eq!(
            solver.solve(&ode, 0.0, 3.0, &[1.0]).unwrap(),
            Termination::Completed
        );
        assert_eq!(solver.final_time(), 3.0);
        assert_close(solver.final_values()[0], ode.exact(3.0, 1.0), 1e-6);
    }
}

#[test]
fn tighter_tolerance_costs_more_steps() {
    let ode = VanDerPol { mu: 1.0 };
    let run = |rtol: f64| {
        let config = SolverConfig::adaptive(
            Method::ExplicitRk(tableau::bogacki_shampine()),
            ErrorControl::Embedded(EmbeddedLaw::ExplicitPi),
            Tolerance::scalar(rtol * 1e-3, rtol),
        );
        let mut solver = Solver::new(config);
        solver.solve(&ode, 0.0, 10.0, &[2.0, 0.0]).unwrap();
        solver.metrics().accepted_steps
    };
    assert!(run(1e-8) > run(1e-4));
}

#[test]
fn step_doubling_tracks_solution() {
    let ode = Decay::new(1.0);
    let config = SolverConfig::adaptive(
        Method::ExplicitRk(tableau::rk4()),
        ErrorControl::StepDoubling,
        Tolerance::scalar(1e-10, 1e-8),
    );
    let mut solver = Solver::new(config);
    solver.solve(&ode, 0.0, 4.0, &[1.0]).unwrap();
    assert_eq!(solver.final_time(), 4.0);
    assert_close(solver.final_values()[0], ode.exact(4.0, 1.0), 1e-7);
    assert_eq!(
        solver.module_order(),
        vec![
            "step_doubling(explicit_rk(rk4))",
            "doubling_estimator",
            "step_controller(doubling)",
        ]
    );
}

#[test]
fn imex_handles_stiff_problem_with_large_steps() {
    let ode = ProtheroRobinson::new(1e5);
    let config = SolverConfig::adaptive(
        Method::Imex(tableau::ars222()),
        ErrorControl::Embedded(EmbeddedLaw::ImplicitPredictive),
        Tolerance::scalar(1e-6, 1e-4),
    );
    let mut solver = Solver::new(config);
    solver.solve(&ode, 0.0, 2.0, &[1.0]).unwrap();
    assert_close(solver.final_values()[0], 2f64.cos(), 1e-3);
    // An explicit method would need h < 2e-5 for stability.
    assert!(solver.metrics().accepted_steps < 2_000);
    assert!(solver.metrics().jacobian_evaluations >= solver.metrics().accepted_steps);
}

#[test]
fn verlet_phase_after_one_period() {
    let ode = HarmonicOscillator::new(1.0);
    let period = 2.0 * std::f64::consts::PI;
    let mut solver = Solver::new(SolverConfig::fixed(Method::StormerVerlet, period / 1000.0));
    solver.solve(&ode, 0.0, period, &[1.0, 0.0]).unwrap();
    assert_close(solver.final_values()[0], 1.0, 1e-4);
    assert_close(solver.final_values()[1], 0.0, 1e-4);
}
