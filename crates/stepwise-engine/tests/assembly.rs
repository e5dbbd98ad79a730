//! Every configuration and assembly failure surfaces before the first
//! right-hand side evaluation.

use stepwise_core::{tableau, Key};
use stepwise_engine::{
    ConfigError, EmbeddedLaw, ErrorControl, Method, SolveError, Solver, SolverConfig,
};
use stepwise_module::{AssemblyError, BindingKind, Supplier};
use stepwise_modules::{
    ControlLaw, ControllerParams, EmbeddedEstimator, GravitationalSystem, StepController,
    Tolerance,
};
use stepwise_test_utils::{ConstantModule, FailingOde};

fn untouched() -> FailingOde {
    FailingOde::new(usize::MAX)
}

#[test]
fn non_embedded_method_with_embedded_control() {
    let ode = untouched();
    let config = SolverConfig::adaptive(
        Method::ExplicitRk(tableau::rk4()),
        ErrorControl::Embedded(EmbeddedLaw::Basic),
        Tolerance::default(),
    );
    let err = Solver::new(config).solve(&ode, 0.0, 1.0, &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::MissingEmbedded { .. })
    ));
    assert_eq!(ode.calls(), 0);
}

#[test]
fn custom_embedded_estimator_on_non_embedded_kernel() {
    let ode = untouched();
    let config = SolverConfig::adaptive(
        Method::ExplicitRk(tableau::rk4()),
        ErrorControl::Custom,
        Tolerance::default(),
    );
    let mut solver = Solver::new(config);
    solver.add_module(Box::new(EmbeddedEstimator::new())).unwrap();
    solver
        .add_module(Box::new(StepController::new(
            ControlLaw::Basic,
            Tolerance::default(),
            ControllerParams::default(),
        )))
        .unwrap();
    let err = solver.solve(&ode, 0.0, 1.0, &[1.0]).unwrap_err();
    match err {
        SolveError::Config(ConfigError::Assembly(AssemblyError::Unsatisfied { module, key })) => {
            assert_eq!(module, "embedded_estimator");
            assert_eq!(key, Key::FinalValuesEmbedded);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(ode.calls(), 0);
    assert!(solver.module_order().is_empty());
}

#[test]
fn cyclic_user_modules() {
    let ode = untouched();
    let mut solver = Solver::new(SolverConfig::fixed(Method::ForwardEuler, 0.1));
    solver
        .add_module(Box::new(
            ConstantModule::new("a", vec![(Key::Custom("a"), 1.0f64.into())])
                .requiring([Key::Custom("b")]),
        ))
        .unwrap();
    solver
        .add_module(Box::new(
            ConstantModule::new("b", vec![(Key::Custom("b"), 2.0f64.into())])
                .requiring([Key::Custom("a")]),
        ))
        .unwrap();
    let err = solver.solve(&ode, 0.0, 1.0, &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::Assembly(AssemblyError::CircularDependency { .. }))
    ));
    assert_eq!(ode.calls(), 0);
}

#[test]
fn verlet_rejects_non_separable_ode() {
    let ode = untouched();
    let mut solver = Solver::new(SolverConfig::fixed(Method::StormerVerlet, 0.1));
    let err = solver.solve(&ode, 0.0, 1.0, &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::Assembly(AssemblyError::Incompatible { .. }))
    ));
    assert_eq!(ode.calls(), 0);
}

#[test]
fn arclength_needs_matching_system() {
    let system = GravitationalSystem::new(vec![1.0, 1.0], 1.0);
    let ode = untouched();
    let mut solver = Solver::new(SolverConfig::fixed(Method::ArclengthVerlet(system), 0.01));
    assert!(solver.solve(&ode, 0.0, 1.0, &[1.0]).is_err());
    assert_eq!(ode.calls(), 0);
}

#[test]
fn bindings_resolve_to_latest_supplier() {
    let mut solver = Solver::new(SolverConfig::default());
    solver
        .solve(&stepwise_test_utils::Decay::new(1.0), 0.0, 1.0, &[1.0])
        .unwrap();
    let order = solver.module_order();
    let controller = order
        .iter()
        .position(|n| *n == "step_controller(basic)")
        .unwrap();
    let kernel = order
        .iter()
        .position(|n| *n == "explicit_rk(dormand_prince)")
        .unwrap();
    let estimate = solver
        .bindings()
        .iter()
        .find(|b| b.consumer == controller && b.key == Key::ErrorEstimate)
        .unwrap();
    assert_eq!(estimate.kind, BindingKind::Required);
    assert!(matches!(estimate.supplier, Supplier::Module(i) if i != kernel));
    let start = solver
        .bindings()
        .iter()
        .find(|b| b.consumer == kernel && b.key == Key::InitialValues)
        .unwrap();
    assert_eq!(start.supplier, Supplier::Root);
    // One binding per (consumer, key).
    let mut seen: Vec<(usize, Key)> = solver.bindings().iter().map(|b| (b.consumer, b.key)).collect();
    let total = seen.len();
    seen.sort_by_key(|(c, k)| (*c, k.name()));
    seen.dedup();
    assert_eq!(seen.len(), total);
}
