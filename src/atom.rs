//! Atoms and the two atom databases.
//!
//! An [`Atom`] is an elementary proposition (a predicate applied to an argument
//! tuple) carrying a soft truth value in `[0, 1]`. The [`AtomStore`] is the
//! random-variable database: it owns every atom a ground kernel can reference,
//! and only atoms in the [`Partition::RandomVariable`] partition may change
//! value. The [`ObservedStore`] holds ground-truth labels used by weight
//! learning.

use std::collections::HashMap;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Unique, niche-optimized identifier for an atom.
///
/// IDs are dense: the atom with ID `n` lives at index `n - 1` of its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AtomId(NonZeroU64);

impl AtomId {
    /// Create an `AtomId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(AtomId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Display for AtomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "atom:{}", self.0)
    }
}

/// Which database partition an atom belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partition {
    /// Evidence: the value is fixed and never inferred.
    Observed,
    /// Latent: the value is the target of inference.
    RandomVariable,
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Observed => write!(f, "observed"),
            Partition::RandomVariable => write!(f, "random-variable"),
        }
    }
}

/// An elementary proposition with a soft truth value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    pub predicate: String,
    pub arguments: Vec<String>,
    value: f64,
    partition: Partition,
}

impl Atom {
    /// Current truth value in `[0, 1]`.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Whether inference may change this atom's value.
    pub fn is_random_variable(&self) -> bool {
        self.partition == Partition::RandomVariable
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.predicate, self.arguments.join(", "))
    }
}

/// Validate a soft truth value.
pub(crate) fn check_truth(atom: impl std::fmt::Display, value: f64) -> ModelResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ModelError::InvalidTruthValue {
            atom: atom.to_string(),
            value,
        })
    }
}

// ---------------------------------------------------------------------------
// Random-variable database
// ---------------------------------------------------------------------------

/// In-memory atom database.
///
/// Atom values are mutated by the reasoner (during MPE inference) and by label
/// clamping (during weight learning); structural changes (new atoms, partition
/// swaps) bump [`AtomStore::generation`].
#[derive(Debug, Clone, Default)]
pub struct AtomStore {
    atoms: Vec<Atom>,
    index: HashMap<(String, Vec<String>), AtomId>,
    generation: u64,
}

impl AtomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new atom and return its ID.
    pub fn insert(
        &mut self,
        predicate: impl Into<String>,
        arguments: Vec<String>,
        value: f64,
        partition: Partition,
    ) -> ModelResult<AtomId> {
        let predicate = predicate.into();
        let key = (predicate, arguments);
        if self.index.contains_key(&key) {
            return Err(ModelError::DuplicateAtom {
                atom: format!("{}({})", key.0, key.1.join(", ")),
            });
        }
        let value = check_truth(format_args!("{}({})", key.0, key.1.join(", ")), value)?;

        let raw = self.atoms.len() as u64 + 1;
        let id = AtomId::new(raw).ok_or_else(|| ModelError::UnknownAtom {
            atom: raw.to_string(),
        })?;
        self.atoms.push(Atom {
            id,
            predicate: key.0.clone(),
            arguments: key.1.clone(),
            value,
            partition,
        });
        self.index.insert(key, id);
        self.generation += 1;
        Ok(id)
    }

    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id.index())
    }

    /// Look an atom up by predicate and arguments.
    pub fn lookup(&self, predicate: &str, arguments: &[String]) -> Option<AtomId> {
        self.index
            .get(&(predicate.to_string(), arguments.to_vec()))
            .copied()
    }

    pub fn contains(&self, id: AtomId) -> bool {
        id.index() < self.atoms.len()
    }

    /// Current value of an atom, `0.0` for unknown IDs.
    pub fn value(&self, id: AtomId) -> f64 {
        self.get(id).map(Atom::value).unwrap_or(0.0)
    }

    /// Whether the atom is currently a random variable. Unknown IDs are not.
    pub fn is_random_variable(&self, id: AtomId) -> bool {
        self.get(id).is_some_and(Atom::is_random_variable)
    }

    /// Set the value of a random-variable atom.
    pub fn set_value(&mut self, id: AtomId, value: f64) -> ModelResult<()> {
        let atom = self
            .atoms
            .get_mut(id.index())
            .ok_or_else(|| ModelError::UnknownAtom {
                atom: id.to_string(),
            })?;
        if !atom.is_random_variable() {
            return Err(ModelError::ObservedAtom {
                atom: atom.to_string(),
            });
        }
        atom.value = check_truth(&*atom, value)?;
        Ok(())
    }

    /// Move an atom to another partition. Returns the previous partition.
    pub fn set_partition(&mut self, id: AtomId, partition: Partition) -> ModelResult<Partition> {
        let atom = self
            .atoms
            .get_mut(id.index())
            .ok_or_else(|| ModelError::UnknownAtom {
                atom: id.to_string(),
            })?;
        let previous = std::mem::replace(&mut atom.partition, partition);
        if previous != partition {
            self.generation += 1;
        }
        Ok(previous)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.iter()
    }

    /// Atoms in the given partition.
    pub fn atoms_in(&self, partition: Partition) -> impl Iterator<Item = &Atom> {
        self.atoms.iter().filter(move |a| a.partition == partition)
    }

    /// IDs of all current random variables, in ID order.
    pub fn random_variables(&self) -> Vec<AtomId> {
        self.atoms_in(Partition::RandomVariable).map(|a| a.id).collect()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Structural generation counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Dense position of an atom, for solvers that keep per-atom arrays.
    pub(crate) fn slot(&self, id: AtomId) -> Option<usize> {
        self.contains(id).then(|| id.index())
    }

    /// Write a value computed by a solver, clamped to `[0, 1]`.
    ///
    /// Skips partition checks; callers only pass slots of random variables.
    pub(crate) fn write_slot(&mut self, slot: usize, value: f64) {
        if let Some(atom) = self.atoms.get_mut(slot) {
            atom.value = value.clamp(0.0, 1.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Observed (ground-truth) database
// ---------------------------------------------------------------------------

/// Ground-truth labels for atoms, keyed by the IDs of an [`AtomStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservedStore {
    labels: HashMap<AtomId, f64>,
}

impl ObservedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the observed value of an atom, replacing any previous label.
    pub fn insert(&mut self, atom: AtomId, value: f64) -> ModelResult<()> {
        let value = check_truth(atom, value)?;
        self.labels.insert(atom, value);
        Ok(())
    }

    pub fn get(&self, atom: AtomId) -> Option<f64> {
        self.labels.get(&atom).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AtomId, f64)> + '_ {
        self.labels.iter().map(|(&id, &v)| (id, v))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
