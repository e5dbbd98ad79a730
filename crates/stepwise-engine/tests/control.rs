//! Stopping, output cadences and unclamped kernels through the solver.

use std::sync::atomic::Ordering;

use stepwise_core::tableau;
use stepwise_engine::{Method, Solver, SolverConfig, Termination};
use stepwise_modules::{
    GravitationalSystem, MemorySink, OutputCadence, StopSignal, StopWhen, TextSink,
};
use stepwise_test_utils::{assert_close, Decay};

#[test]
fn predicate_stops_at_first_crossing() {
    let mut solver = Solver::new(SolverConfig::default());
    solver
        .add_module(Box::new(StopWhen::new(|_t, y| y[0] < 0.5)))
        .unwrap();
    let reason = solver.solve(&Decay::new(1.0), 0.0, 10.0, &[1.0]).unwrap();
    assert_eq!(reason, Termination::Stopped);
    assert!(solver.final_values()[0] < 0.5);
    assert!(solver.final_time() > std::f64::consts::LN_2);
    assert!(solver.final_time() < 10.0);
}

#[test]
fn raised_flag_stops_after_one_attempt() {
    let (flag, signal) = StopSignal::pair();
    flag.store(true, Ordering::Release);
    let mut solver = Solver::new(SolverConfig::default());
    solver.add_module(Box::new(signal)).unwrap();
    let reason = solver.solve(&Decay::new(1.0), 0.0, 10.0, &[1.0]).unwrap();
    assert_eq!(reason, Termination::Stopped);
    assert_eq!(solver.metrics().attempts(), 1);
}

#[test]
fn fixed_count_output_is_exact_on_adaptive_run() {
    let sink = MemorySink::new();
    let mut solver = Solver::new(SolverConfig::default());
    solver
        .add_output(Box::new(sink.clone()), OutputCadence::FixedCount(11))
        .unwrap();
    let ode = Decay::new(1.0);
    solver.solve(&ode, 0.0, 2.0, &[1.0]).unwrap();
    let sol = sink.solution();
    let expected: Vec<f64> = (0..11).map(|i| 2.0 * (i as f64 / 10.0)).collect();
    assert_eq!(sol.times, expected);
    for (t, y) in sol.times.iter().zip(&sol.values) {
        assert_close(y[0], ode.exact(*t, 1.0), 1e-3);
    }
}

#[test]
fn explicit_times_and_all_points_side_by_side() {
    let every = MemorySink::new();
    let chosen = MemorySink::new();
    let mut solver = Solver::new(SolverConfig::fixed(
        Method::ExplicitRk(tableau::rk4()),
        0.2,
    ));
    solver
        .add_output(Box::new(every.clone()), OutputCadence::AllPoints)
        .unwrap();
    solver
        .add_output(
            Box::new(chosen.clone()),
            OutputCadence::Times(vec![0.55, 0.1]),
        )
        .unwrap();
    solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
    assert_eq!(chosen.solution().times, vec![0.1, 0.55]);
    // Both output stops shorten steps for every sink.
    let times = every.solution().times;
    assert_eq!(times.first(), Some(&0.0));
    assert_eq!(times.last(), Some(&1.0));
    assert!(times.contains(&0.1) && times.contains(&0.55));
}

#[test]
fn text_sink_runs_through_solver() {
    let mut solver = Solver::new(SolverConfig::fixed(Method::ForwardEuler, 0.5));
    let sink = TextSink::new(Vec::new());
    solver
        .add_output(Box::new(sink), OutputCadence::AllPoints)
        .unwrap();
    solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
    assert_eq!(solver.metrics().accepted_steps, 2);
}

#[test]
fn arclength_run_ends_past_final_time() {
    let system = GravitationalSystem::new(vec![1.0, 1.0], 1.0);
    let speed = 0.4;
    let y0 = vec![
        -0.5, 0.0, 0.0, 0.5, 0.0, 0.0, //
        0.0, -speed, 0.0, 0.0, speed, 0.0,
    ];
    let sink = MemorySink::new();
    let mut solver = Solver::new(SolverConfig::fixed(
        Method::ArclengthVerlet(system.clone()),
        0.01,
    ));
    solver
        .add_output(Box::new(sink.clone()), OutputCadence::FixedInterval(1.0))
        .unwrap();
    let reason = solver.solve(&system, 0.0, 5.0, &y0).unwrap();
    assert_eq!(reason, Termination::Completed);
    assert!(solver.final_time() >= 5.0);
    let e0 = system.energy(&y0);
    let drift = ((system.energy(solver.final_values()) - e0) / e0).abs();
    assert!(drift < 1e-6, "relative energy error {drift}");
    // Targets inside a step are interpolated, so each lands on time.
    let solution = sink.solution();
    assert_eq!(solution.times.len(), 6);
    for (k, (t, y)) in solution.times.iter().zip(&solution.values).enumerate() {
        assert!((t - k as f64).abs() < 1e-9, "point {k} at {t}");
        let drift = ((system.energy(y) - e0) / e0).abs();
        assert!(drift < 1e-4, "point {k} energy error {drift}");
    }
}
