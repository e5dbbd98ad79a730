//! Dependency ordering, satisfaction and assembly of a module list.
//!
//! [`assemble`] runs once per solve, before any right-hand side
//! evaluation, and freezes the result in a [`Pipeline`]:
//!
//! 1. Promote required-if-present keys that someone supplies.
//! 2. Reject keys nobody supplies ([`AssemblyError::Unsatisfied`]).
//! 3. Order modules so every requirement is supplied earlier
//!    ([`order_modules`]).
//! 4. Bind every consumed key to its most recent supplier
//!    ([`satisfy_modules`]).
//! 5. Let each module check the ODE ([`Module::validate`]).

use indexmap::IndexMap;
use stepwise_core::{Key, KeySet, Ode};

use crate::module::Module;

use std::error::Error;
use std::fmt;

// ── Bindings ───────────────────────────────────────────────────────

/// Where a consumed key comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Supplier {
    /// Seeded by the solver before the first module runs.
    Root,
    /// Published by the module at this index of the ordered pipeline.
    Module(usize),
}

/// Whether a binding serves a required or a requested key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    /// The key must be present.
    Required,
    /// The key is read only if present.
    Requested,
}

/// One `consumer ← supplier` edge of the satisfied pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Index of the consuming module in the ordered pipeline.
    pub consumer: usize,
    /// The consumed key.
    pub key: Key,
    /// The most recent supplier of `key` before `consumer`.
    pub supplier: Supplier,
    /// Required or requested.
    pub kind: BindingKind,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from pipeline assembly (before integration, never mid-run).
#[derive(Clone, Debug, PartialEq)]
pub enum AssemblyError {
    /// No modules registered.
    EmptyAssembly,

    /// A required key is supplied by nobody, or only by later modules.
    Unsatisfied {
        /// The consuming module.
        module: String,
        /// The missing key.
        key: Key,
    },

    /// No remaining module can be placed.
    CircularDependency {
        /// Names of the modules left unplaced, in input order.
        remaining: Vec<String>,
    },

    /// A module rejected the ODE.
    Incompatible {
        /// The rejecting module.
        module: String,
        /// Why.
        reason: String,
    },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAssembly => write!(f, "pipeline has no modules"),
            Self::Unsatisfied { module, key } => {
                write!(f, "module '{module}' requires '{key}' but nothing supplies it")
            }
            Self::CircularDependency { remaining } => {
                write!(f, "circular dependency among modules: {}", remaining.join(", "))
            }
            Self::Incompatible { module, reason } => {
                write!(f, "module '{module}' is incompatible with the ODE: {reason}")
            }
        }
    }
}

impl Error for AssemblyError {}

// ── Ordering ───────────────────────────────────────────────────────

/// Effective required keys of each module.
///
/// A required-if-present key becomes required when the root or any other
/// module supplies it.
pub fn effective_requirements(modules: &[Box<dyn Module>], root: &KeySet) -> Vec<KeySet> {
    modules
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let decls = m.declarations();
            let mut req = decls.requires().clone();
            for &key in decls.requires_if_present() {
                let supplied_elsewhere = root.contains(key)
                    || modules
                        .iter()
                        .enumerate()
                        .any(|(j, o)| j != i && o.declarations().supplies().contains(key));
                if supplied_elsewhere {
                    req.insert(key);
                }
            }
            req
        })
        .collect()
}

/// Whether module `i` may be placed now with respect to other unplaced
/// suppliers of its required keys.
///
/// For each required key `R`: if `i` itself re-supplies `R` it chains
/// `R`, and every other unplaced supplier of `R` must chain it too.
/// Otherwise no other unplaced module may supply `R`.
fn permitted(
    i: usize,
    requirements: &[KeySet],
    supplies: &[&KeySet],
    placed: &[bool],
) -> bool {
    for &key in &requirements[i] {
        let chains = supplies[i].contains(key);
        for j in 0..requirements.len() {
            if j == i || placed[j] || !supplies[j].contains(key) {
                continue;
            }
            let other_chains = requirements[j].contains(key);
            if !chains || !other_chains {
                return false;
            }
        }
    }
    true
}

/// Order modules so every required key is supplied by the root or an
/// earlier module.
///
/// Greedy worklist: at each round the first placeable and permitted
/// module in input order is appended. Returns indices into `modules`.
///
/// # Errors
///
/// [`AssemblyError::CircularDependency`] if a round places nothing.
pub fn order_modules(
    modules: &[Box<dyn Module>],
    root: &KeySet,
) -> Result<Vec<usize>, AssemblyError> {
    let requirements = effective_requirements(modules, root);
    order_by_requirements(modules, root, &requirements)
}

fn order_by_requirements(
    modules: &[Box<dyn Module>],
    root: &KeySet,
    requirements: &[KeySet],
) -> Result<Vec<usize>, AssemblyError> {
    let n = modules.len();
    let supplies: Vec<&KeySet> = modules.iter().map(|m| m.declarations().supplies()).collect();
    let mut supplied = root.clone();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while order.len() < n {
        let next = (0..n).find(|&i| {
            !placed[i]
                && requirements[i].is_subset(&supplied)
                && permitted(i, requirements, &supplies, &placed)
        });
        match next {
            Some(i) => {
                placed[i] = true;
                supplied.extend_from(supplies[i]);
                order.push(i);
            }
            None => {
                let remaining = (0..n)
                    .filter(|&i| !placed[i])
                    .map(|i| modules[i].name().to_string())
                    .collect();
                return Err(AssemblyError::CircularDependency { remaining });
            }
        }
    }
    Ok(order)
}

// ── Satisfaction ───────────────────────────────────────────────────

/// Bind each consumed key of an already-ordered module list to its most
/// recent supplier.
///
/// `requirements[i]` are the effective required keys of `ordered[i]`.
/// Requested keys are bound when some earlier supplier exists and are
/// skipped otherwise. The result has exactly one
/// [`BindingKind::Required`] entry per required key per module.
///
/// # Errors
///
/// [`AssemblyError::Unsatisfied`] for the first required key with no
/// earlier supplier.
pub fn satisfy_modules(
    ordered: &[Box<dyn Module>],
    requirements: &[KeySet],
    root: &KeySet,
) -> Result<Vec<Binding>, AssemblyError> {
    let mut last: IndexMap<Key, Supplier> = root.iter().map(|&k| (k, Supplier::Root)).collect();
    let mut bindings = Vec::new();

    for (i, module) in ordered.iter().enumerate() {
        let decls = module.declarations();
        for &key in &requirements[i] {
            let supplier = *last.get(&key).ok_or_else(|| AssemblyError::Unsatisfied {
                module: module.name().to_string(),
                key,
            })?;
            bindings.push(Binding {
                consumer: i,
                key,
                supplier,
                kind: BindingKind::Required,
            });
        }
        for &key in decls.requests() {
            if requirements[i].contains(key) {
                continue;
            }
            if let Some(&supplier) = last.get(&key) {
                bindings.push(Binding {
                    consumer: i,
                    key,
                    supplier,
                    kind: BindingKind::Requested,
                });
            }
        }
        for &key in decls.supplies() {
            last.insert(key, Supplier::Module(i));
        }
    }
    Ok(bindings)
}

// ── Assembly ───────────────────────────────────────────────────────

/// A frozen, ordered and satisfied module list.
pub struct Pipeline {
    modules: Vec<Box<dyn Module>>,
    requirements: Vec<KeySet>,
    bindings: Vec<Binding>,
    root: KeySet,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("modules", &self.names())
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl Pipeline {
    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the pipeline is empty (never true for an assembled one).
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in execution order.
    pub fn modules(&self) -> &[Box<dyn Module>] {
        &self.modules
    }

    /// Mutable access for lifecycle hooks.
    pub fn modules_mut(&mut self) -> &mut [Box<dyn Module>] {
        &mut self.modules
    }

    /// Module names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Effective required keys of the module at `index`.
    pub fn requirements(&self, index: usize) -> Option<&KeySet> {
        self.requirements.get(index)
    }

    /// Consumer-to-supplier diagnostic map.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Keys the solver seeds before the first module.
    pub fn root(&self) -> &KeySet {
        &self.root
    }

    /// The last supplier of `key` in the whole pipeline, if any.
    pub fn final_supplier(&self, key: Key) -> Option<Supplier> {
        self.modules
            .iter()
            .rposition(|m| m.declarations().supplies().contains(key))
            .map(Supplier::Module)
            .or_else(|| self.root.contains(key).then_some(Supplier::Root))
    }

    /// Whether any module (or the root) supplies `key`.
    pub fn supplies(&self, key: Key) -> bool {
        self.final_supplier(key).is_some()
    }

    /// Give the modules back, in execution order.
    pub fn into_modules(self) -> Vec<Box<dyn Module>> {
        self.modules
    }
}

/// Assemble `modules` into a [`Pipeline`] seeded with `root` keys.
///
/// Checks performed (all before integration):
///
/// 1. The list is non-empty.
/// 2. Every effective requirement has a supplier somewhere.
/// 3. A total order exists ([`order_modules`]).
/// 4. Every requirement is supplied earlier ([`satisfy_modules`]).
/// 5. Every module accepts the ODE ([`Module::validate`]).
pub fn assemble(
    modules: Vec<Box<dyn Module>>,
    root: &KeySet,
    ode: &dyn Ode,
) -> Result<Pipeline, AssemblyError> {
    if modules.is_empty() {
        return Err(AssemblyError::EmptyAssembly);
    }

    let requirements = effective_requirements(&modules, root);

    for (module, req) in modules.iter().zip(&requirements) {
        for &key in req {
            let supplied = root.contains(key)
                || modules
                    .iter()
                    .any(|m| m.declarations().supplies().contains(key));
            if !supplied {
                return Err(AssemblyError::Unsatisfied {
                    module: module.name().to_string(),
                    key,
                });
            }
        }
    }

    let order = order_by_requirements(&modules, root, &requirements)?;

    let mut slots: Vec<Option<Box<dyn Module>>> = modules.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(order.len());
    let mut ordered_requirements = Vec::with_capacity(order.len());
    for &i in &order {
        if let Some(m) = slots[i].take() {
            ordered.push(m);
            ordered_requirements.push(requirements[i].clone());
        }
    }

    let bindings = satisfy_modules(&ordered, &ordered_requirements, root)?;

    for module in &ordered {
        module
            .validate(ode)
            .map_err(|e| AssemblyError::Incompatible {
                module: module.name().to_string(),
                reason: e.to_string(),
            })?;
    }

    Ok(Pipeline {
        modules: ordered,
        requirements: ordered_requirements,
        bindings,
        root: root.clone(),
    })
}
