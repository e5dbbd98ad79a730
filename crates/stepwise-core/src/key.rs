//! Property keys and the [`KeySet`] declaration set.

use smallvec::SmallVec;
use std::fmt;

/// Identifies one entry in a [`PropertyBag`](crate::PropertyBag).
///
/// Well-known keys cover every quantity exchanged by the built-in
/// modules. User modules that need private channels use
/// [`Key::Custom`] with a static name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Start of the step interval (root-supplied scalar).
    InitialTime,
    /// Nominal end of the step interval (root-supplied scalar).
    FinalTime,
    /// Step size in the integration variable (root-supplied scalar).
    StepSize,
    /// State at the start of the step (root-supplied vector).
    InitialValues,
    /// Trial state at the end of the step.
    FinalValues,
    /// Lower-order companion solution from an embedded weight vector.
    FinalValuesEmbedded,
    /// Step-doubling result from two half steps.
    FinalValuesFine,
    /// Step-doubling result from one full step.
    FinalValuesCoarse,
    /// `f(t1, y1)` computed by an FSAL kernel.
    FinalDerivative,
    /// Component-wise local error estimate.
    ErrorEstimate,
    /// RMS-normalized error `ε` computed by a controller.
    NormalizedError,
    /// Order of the stepping kernel.
    Order,
    /// Order of the embedded companion solution.
    EmbeddedOrder,
    /// The tableau used by the kernel.
    Scheme,
    /// `∂f/∂y` evaluated at the start of the step.
    Jacobian,
    /// Controller verdict for the step.
    Accepted,
    /// Step size proposed for the next attempt.
    NextStepSize,
    /// Physical time reached by kernels that advance a different variable.
    AdvancedTime,
    /// Cooperative request to end the run after this step.
    Stop,
    /// A user-defined key.
    Custom(&'static str),
}

impl Key {
    /// Stable snake-case name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialTime => "initial_time",
            Self::FinalTime => "final_time",
            Self::StepSize => "step_size",
            Self::InitialValues => "initial_values",
            Self::FinalValues => "final_values",
            Self::FinalValuesEmbedded => "final_values_embedded",
            Self::FinalValuesFine => "final_values_fine",
            Self::FinalValuesCoarse => "final_values_coarse",
            Self::FinalDerivative => "final_derivative",
            Self::ErrorEstimate => "error_estimate",
            Self::NormalizedError => "normalized_error",
            Self::Order => "order",
            Self::EmbeddedOrder => "embedded_order",
            Self::Scheme => "scheme",
            Self::Jacobian => "jacobian",
            Self::Accepted => "accepted",
            Self::NextStepSize => "next_step_size",
            Self::AdvancedTime => "advanced_time",
            Self::Stop => "stop",
            Self::Custom(name) => *name,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An insertion-ordered set of keys.
///
/// Modules declare their dependencies as `KeySet`s. Iteration order is
/// the order keys were first inserted, which keeps assembly diagnostics
/// deterministic.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: SmallVec<[Key; 6]>,
}

impl KeySet {
    /// Create an empty key set.
    pub fn empty() -> Self {
        Self {
            keys: SmallVec::new(),
        }
    }

    /// Insert a key. Returns `false` if it was already present.
    pub fn insert(&mut self, key: Key) -> bool {
        if self.contains(key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Check whether the set contains a key.
    pub fn contains(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    /// Insert every key from `other`, preserving first-seen order.
    pub fn extend_from(&mut self, other: &KeySet) {
        for &key in other.iter() {
            self.insert(key);
        }
    }

    /// Return the union of two sets (`self` order first, then new keys of `other`).
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.extend_from(other);
        out
    }

    /// Keys in `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.iter().copied().filter(|&k| !other.contains(k)).collect()
    }

    /// Check whether every key of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.iter().all(|&k| other.contains(k))
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Iterate over keys in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }
}

impl PartialEq for KeySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }
}

impl Eq for KeySet {}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = Self::empty();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl Extend<Key> for KeySet {
    fn extend<I: IntoIterator<Item = Key>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl<const N: usize> From<[Key; N]> for KeySet {
    fn from(keys: [Key; N]) -> Self {
        keys.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, key) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const POOL: [Key; 8] = [
        Key::InitialTime,
        Key::FinalTime,
        Key::InitialValues,
        Key::FinalValues,
        Key::ErrorEstimate,
        Key::Accepted,
        Key::Custom("a"),
        Key::Custom("b"),
    ];

    fn arb_key_set() -> impl Strategy<Value = KeySet> {
        prop::collection::vec(0usize..POOL.len(), 0..12)
            .prop_map(|idx| idx.into_iter().map(|i| POOL[i]).collect::<KeySet>())
    }

    #[test]
    fn insert_deduplicates() {
        let mut set = KeySet::empty();
        assert!(set.insert(Key::FinalValues));
        assert!(!set.insert(Key::FinalValues));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let set = KeySet::from([Key::Stop, Key::InitialTime, Key::Custom("z")]);
        let keys: Vec<Key> = set.iter().copied().collect();
        assert_eq!(keys, vec![Key::Stop, Key::InitialTime, Key::Custom("z")]);
    }

    #[test]
    fn equality_ignores_order() {
        let a = KeySet::from([Key::Order, Key::Scheme]);
        let b = KeySet::from([Key::Scheme, Key::Order]);
        assert_eq!(a, b);
    }

    #[test]
    fn custom_keys_display_their_name() {
        assert_eq!(Key::Custom("energy").to_string(), "energy");
        assert_eq!(Key::FinalValuesEmbedded.to_string(), "final_values_embedded");
        let set = KeySet::from([Key::Accepted, Key::NextStepSize]);
        assert_eq!(set.to_string(), "{accepted, next_step_size}");
    }

    proptest! {
        #[test]
        fn union_contains_both(a in arb_key_set(), b in arb_key_set()) {
            let u = a.union(&b);
            prop_assert!(a.is_subset(&u));
            prop_assert!(b.is_subset(&u));
        }

        #[test]
        fn union_commutative_as_set(a in arb_key_set(), b in arb_key_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn difference_removes_common(a in arb_key_set(), b in arb_key_set()) {
            let diff = a.difference(&b);
            for &key in diff.iter() {
                prop_assert!(a.contains(key));
                prop_assert!(!b.contains(key));
            }
        }

        #[test]
        fn len_matches_iter_count(a in arb_key_set()) {
            prop_assert_eq!(a.len(), a.iter().count());
        }
    }
}
