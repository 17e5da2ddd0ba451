//! Process placement advice
//!
//! When a process opens a device context, the registry recommends a CPU for
//! it to run on. Recommendations spread processes over the machine:
//!
//! - First hyperthreads of all cores are handed out before second
//!   hyperthreads, and so on.
//! - Within a hyperthread rank, CPUs of the device's NUMA node come first.
//! - Within a node, CPUs that do not handle device interrupts come first.
//!
//! Once every CPU has been recommended, recommendations start over from the
//! beginning, following the same generation protocol as interrupt pools.

use super::AffinityRegistry;
use crate::{cpu::cpuset::CpuSet, errors::AffinityError};
#[cfg(doc)]
use crate::cpu::binding::current_thread_cpuset;
use derive_more::Display;
use tracing::debug;

/// Outcome of [`AffinityRegistry::advise_process_cpu()`]
#[derive(Copy, Clone, Debug, Display, Eq, Hash, PartialEq)]
pub enum ProcessAdvice {
    /// The process is already bound to this single CPU, which has been
    /// accounted for
    #[display("pinned to CPU {_0}")]
    Pinned(usize),

    /// The process is already restricted to a subset of the CPUs, which it
    /// should keep
    #[display("restricted by its owner")]
    Restricted,

    /// The process should bind itself to this CPU
    #[display("assigned CPU {_0}")]
    Assigned(usize),
}
//
impl ProcessAdvice {
    /// CPU that the process runs on, if there is a single one
    pub fn cpu(&self) -> Option<usize> {
        match self {
            Self::Pinned(cpu) | Self::Assigned(cpu) => Some(*cpu),
            Self::Restricted => None,
        }
    }
}

/// # Process placement
impl AffinityRegistry {
    /// Recommend a CPU for a process that opens a context on a device homed
    /// on NUMA node `node`, given the set of CPUs the process may run on
    ///
    /// CPUs that are recommended with [`ProcessAdvice::Assigned`] or
    /// accounted for with [`ProcessAdvice::Pinned`] should be given back with
    /// [`release_process_cpu()`](Self::release_process_cpu) when the process
    /// closes its context.
    ///
    /// # Errors
    ///
    /// - [`NoCpuAvailable`] if no CPU could be recommended. The process
    ///   should keep its current affinity.
    ///
    /// [`NoCpuAvailable`]: AffinityError::NoCpuAvailable
    pub fn advise_process_cpu(
        &self,
        node: usize,
        allowed: &CpuSet,
    ) -> Result<ProcessAdvice, AffinityError> {
        let mut state = self.state.lock();
        if allowed.weight() == 1 {
            if let Some(cpu) = allowed.first_set() {
                let accounted = state.process_pool.mark_used(cpu);
                debug!(cpu, accounted, "process is pinned");
                return Ok(ProcessAdvice::Pinned(cpu));
            }
        }
        if allowed.weight() < state.process_pool.mask().weight() {
            debug!(%allowed, "process affinity is restricted");
            return Ok(ProcessAdvice::Restricted);
        }

        state.process_pool.wrap_if_exhausted();
        let interrupt_cpus = state
            .entries
            .get(&node)
            .map(|entry| entry.interrupt_cpus())
            .unwrap_or_default();
        debug!(%interrupt_cpus, "CPUs used by interrupts");

        // Stop at the first hyperthread rank that still has unused CPUs
        let pool = &state.process_pool;
        let hw_threads = if self.core_siblings > 1 {
            let mut hw_threads = CpuSet::new();
            for rank in 0..self.core_siblings {
                hw_threads = self.find_hw_thread_mask(rank, pool.mask());
                if !(&hw_threads - pool.used()).is_empty() {
                    break;
                }
            }
            debug!(%hw_threads, "same hyperthread rank on all cores");
            hw_threads
        } else {
            pool.mask().clone()
        };

        let node_cpus = self
            .topology
            .node_cpuset(node)
            .cloned()
            .unwrap_or_default();
        debug!(node, %node_cpus, "CPUs of the device's NUMA node");
        let prefer_idle = |available: CpuSet| {
            let idle = &available - &interrupt_cpus;
            if idle.is_empty() {
                available
            } else {
                idle
            }
        };
        let mut available = prefer_idle((&hw_threads & &node_cpus) - pool.used());
        debug!(node, %available, "available CPUs on the device's NUMA node");
        if available.is_empty() {
            available = prefer_idle(&hw_threads - &node_cpus - pool.used());
            debug!(%available, "available CPUs on other NUMA nodes");
        }

        let cpu = available
            .first_set()
            .ok_or(AffinityError::NoCpuAvailable)?;
        state.process_pool.mark_used(cpu);
        debug!(cpu, "process assigned");
        Ok(ProcessAdvice::Assigned(cpu))
    }

    /// Like [`advise_process_cpu()`](Self::advise_process_cpu), for the
    /// calling thread's current CPU affinity
    ///
    /// # Errors
    ///
    /// - [`NoCpuAvailable`] if no CPU could be recommended, or if the
    ///   calling thread's affinity could not be queried, see
    ///   [`current_thread_cpuset()`]
    ///
    /// [`NoCpuAvailable`]: AffinityError::NoCpuAvailable
    #[cfg(target_os = "linux")]
    pub fn advise_current_thread_cpu(&self, node: usize) -> Result<ProcessAdvice, AffinityError> {
        let allowed = crate::cpu::binding::current_thread_cpuset().map_err(|error| {
            debug!(%error, "cannot query the calling thread's affinity");
            AffinityError::NoCpuAvailable
        })?;
        self.advise_process_cpu(node, &allowed)
    }

    /// Give back a CPU that was recommended to a process
    ///
    /// CPUs that the registry never recommends are ignored.
    pub fn release_process_cpu(&self, cpu: usize) {
        let mut state = self.state.lock();
        if !state.process_pool.mask().is_set(cpu) {
            return;
        }
        state.process_pool.release(cpu);
        debug!(cpu, "CPU returned for future process placement");
    }

    /// CPUs of `mask` that have the same hyperthread rank `rank` within
    /// their physical core
    ///
    /// This assumes the usual x86 Linux numbering, where the first hyperthread
    /// of every core comes first, then the second hyperthread of every core,
    /// and so on. The result is clipped to `mask`.
    pub(crate) fn find_hw_thread_mask(&self, rank: usize, mask: &CpuSet) -> CpuSet {
        let core_siblings = self.core_siblings.max(1);
        let nodes = self.topology.online_node_count().max(1);
        let cores_per_node = self.topology.online_cpu_count() / core_siblings / nodes;
        let total_cores = (cores_per_node * nodes).max(1);
        let first_rank = mask.lowest(total_cores);
        &(&first_rank << (total_cores * rank)) & mask
    }
}
