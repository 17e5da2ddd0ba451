//! Round-robin CPU pools
//!
//! An [`AllocatablePool`] hands out the CPUs of a fixed mask lowest first,
//! and only starts reusing CPUs once every member of the mask has been handed
//! out. Each such wraparound bumps a generation counter, which is also how
//! consumers tell whether a pool has settled into reusing CPUs.

use crate::cpu::cpuset::CpuSet;
#[cfg(any(test, feature = "proptest"))]
use proptest::prelude::*;
use strum::Display;
use tracing::debug;

/// Set of CPUs that are handed out in round-robin order
///
/// As a type invariant, `used` is always a subset of `mask`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AllocatablePool {
    /// CPUs that this pool may hand out
    mask: CpuSet,

    /// CPUs that have been handed out in the current generation
    used: CpuSet,

    /// Number of times the pool was exhausted and started over, minus the
    /// number of times it was drained back to idle
    generation: usize,
}

impl AllocatablePool {
    /// Set up a pool that hands out the CPUs of `mask`, none used yet
    pub fn new(mask: CpuSet) -> Self {
        Self {
            mask,
            used: CpuSet::new(),
            generation: 0,
        }
    }

    /// CPUs that this pool may hand out
    pub fn mask(&self) -> &CpuSet {
        &self.mask
    }

    /// CPUs that are handed out in the current generation
    pub fn used(&self) -> &CpuSet {
        &self.used
    }

    /// Wraparound counter
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Truth that every CPU of the mask is handed out
    pub fn is_exhausted(&self) -> bool {
        self.used == self.mask
    }

    /// CPUs that can be handed out without starting a new generation
    pub fn available(&self) -> CpuSet {
        &self.mask - &self.used
    }

    /// CPUs that this pool should be assumed to occupy
    ///
    /// Once a pool has wrapped around, all of its CPUs are likely in use, so
    /// the whole mask is reported. Before that, only the CPUs that were
    /// actually handed out are.
    pub fn occupied(&self) -> &CpuSet {
        if self.generation > 0 {
            &self.mask
        } else {
            &self.used
        }
    }

    /// Hand out the lowest CPU that is not used yet
    ///
    /// If every CPU is used, a new generation starts and all CPUs become
    /// available again. Returns `None` if the mask is empty.
    pub fn allocate(&mut self) -> Option<usize> {
        if self.mask.is_empty() {
            return None;
        }
        self.wrap_if_exhausted();
        let cpu = self.available().first_set()?;
        self.used.set(cpu);
        Some(cpu)
    }

    /// Give back a CPU that was handed out by [`allocate()`](Self::allocate)
    ///
    /// If this leaves no CPU in use on a pool that had wrapped around, the
    /// generation is decremented and every CPU is marked used again, so that
    /// the next allocation starts a fresh cycle instead of handing the same
    /// CPUs out again.
    pub fn release(&mut self, cpu: usize) {
        self.used.unset(cpu);
        if self.used.is_empty() && self.generation > 0 {
            self.generation -= 1;
            self.used.copy_from(&self.mask);
            debug!(mask = %self.mask, generation = self.generation, "pool drained back to idle");
        }
    }

    /// Start a new generation if every CPU is used
    ///
    /// Returns `true` if a new generation was started. Empty pools never
    /// wrap around.
    pub(crate) fn wrap_if_exhausted(&mut self) -> bool {
        if self.mask.is_empty() || !self.is_exhausted() {
            return false;
        }
        self.generation += 1;
        self.used.clear();
        debug!(mask = %self.mask, generation = self.generation, "pool wrapped around");
        true
    }

    /// Record that `cpu` is in use without going through the round-robin
    ///
    /// CPUs outside of the mask are ignored, and `false` is returned.
    pub(crate) fn mark_used(&mut self, cpu: usize) -> bool {
        if !self.mask.is_set(cpu) {
            return false;
        }
        self.used.set(cpu);
        true
    }

    /// Enlarge the mask with a CPU that is already in use
    pub(crate) fn insert_used(&mut self, cpu: usize) {
        self.mask.set(cpu);
        self.used.set(cpu);
    }

    /// Remove a CPU from the mask
    pub(crate) fn remove(&mut self, cpu: usize) {
        self.mask.unset(cpu);
        self.used.unset(cpu);
    }
}

#[cfg(any(test, feature = "proptest"))]
impl Arbitrary for AllocatablePool {
    type Parameters = ();
    type Strategy = prop::strategy::Map<
        (
            <CpuSet as Arbitrary>::Strategy,
            <CpuSet as Arbitrary>::Strategy,
            std::ops::Range<usize>,
        ),
        fn((CpuSet, CpuSet, usize)) -> Self,
    >;

    fn arbitrary_with(args: ()) -> Self::Strategy {
        (
            CpuSet::arbitrary_with(args),
            CpuSet::arbitrary_with(args),
            0..4usize,
        )
            .prop_map(|(mask, used, generation)| {
                let used = used & &mask;
                Self {
                    mask,
                    used,
                    generation,
                }
            })
    }
}

/// Kind of [`AllocatablePool`] in the registry, for diagnostics
#[derive(Copy, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum PoolKind {
    /// Default pool of a NUMA node, used for DMA engine interrupts
    Default,

    /// Receive context pool of a NUMA node
    Receive,

    /// Registry-wide pool of CPUs recommended to processes
    Process,
}
