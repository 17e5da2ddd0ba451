//! CPU affinity registry
//!
//! An [`AffinityRegistry`] is shared by every device and process of a host.
//! It decides which CPU each device interrupt is steered to, and which CPU
//! processes that open device contexts are advised to run on:
//!
//! - [Interrupt placement](AffinityRegistry#interrupt-placement) splits the
//!   real CPUs of each NUMA node into per-category pools when the first
//!   device of the node attaches, then hands their CPUs out round-robin.
//! - [Process placement](AffinityRegistry#process-placement) spreads
//!   processes over hyperthread ranks and NUMA nodes, steering clear of the
//!   CPUs that handle interrupts.
//!
//! All mutable state lives behind a single lock, which is only held for the
//! duration of a bounded amount of bitmap arithmetic.

pub mod irq;
pub mod node;
pub mod pool;
pub mod process;

use self::{node::NodeAffinityEntry, pool::AllocatablePool};
use crate::{cpu::cpuset::CpuSet, memory::nodeset::NodeSet, topology::Topology};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::info;

/// Host-wide registry of interrupt and process CPU placements
///
/// Since there are several things you can do with a registry, the API is
/// broken down into sections:
///
/// - [Registry lifecycle](#registry-lifecycle)
/// - [Topology counters](#topology-counters)
/// - [Inspection](#inspection)
/// - [Interrupt placement](#interrupt-placement)
/// - [Process placement](#process-placement)
#[derive(Debug)]
pub struct AffinityRegistry {
    /// Machine that CPUs are allocated from
    topology: Topology,

    /// Online CPUs, with a single hyperthread per physical core
    real_cpuset: CpuSet,

    /// Number of hyperthreads of the first online CPU's core
    core_siblings: usize,

    /// Number of enumerated devices homed on each NUMA node
    devices_per_node: BTreeMap<usize, usize>,

    /// Mutable allocation state
    state: Mutex<RegistryState>,
}

/// Mutable state of an [`AffinityRegistry`]
#[derive(Debug)]
struct RegistryState {
    /// Interrupt CPU pools of NUMA nodes with an attached device
    entries: BTreeMap<usize, NodeAffinityEntry>,

    /// CPUs that are recommended to processes
    process_pool: AllocatablePool,
}

/// # Registry lifecycle
impl AffinityRegistry {
    /// Set up a registry for a machine
    ///
    /// `device_nodes` enumerates the devices that may attach later, by home
    /// NUMA node. Devices whose node is unknown are counted on the node of
    /// the CPU that creates the registry. These counts decide how many
    /// receive CPUs are set aside when a node's first device attaches.
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::{affinity::AffinityRegistry, topology::Topology};
    ///
    /// let topology = Topology::builder()
    ///     .with_node(0, "0-7".parse()?)
    ///     .build()?;
    /// let registry = AffinityRegistry::new(topology, [Some(0), Some(0), None]);
    /// assert_eq!(registry.devices_on_node(0), 3);
    /// assert_eq!(registry.process_pool().mask().to_string(), "0-7");
    /// # Ok::<(), eyre::Report>(())
    /// ```
    pub fn new(topology: Topology, device_nodes: impl IntoIterator<Item = Option<usize>>) -> Self {
        let real_cpuset = compute_real_cpuset(&topology);
        let core_siblings = topology
            .online_cpuset()
            .first_set()
            .and_then(|first| topology.siblings(first))
            .map_or(1, |siblings| siblings.weight());

        let mut devices_per_node = BTreeMap::new();
        for node in device_nodes {
            let node = node.unwrap_or_else(|| topology.current_node());
            *devices_per_node.entry(node).or_insert(0) += 1;
        }

        let process_pool = AllocatablePool::new(topology.online_cpuset().clone());
        info!(
            online = %topology.online_cpuset(),
            real = %real_cpuset,
            core_siblings,
            nodes = %topology.online_nodeset(),
            "set up CPU affinity registry"
        );
        Self {
            topology,
            real_cpuset,
            core_siblings,
            devices_per_node,
            state: Mutex::new(RegistryState {
                entries: BTreeMap::new(),
                process_pool,
            }),
        }
    }

    /// Tear down the registry, freeing every NUMA node entry
    pub fn destroy(self) {
        let state = self.state.into_inner();
        info!(
            entries = state.entries.len(),
            "tore down CPU affinity registry"
        );
    }
}

/// # Topology counters
impl AffinityRegistry {
    /// Machine that CPUs are allocated from
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Online CPUs, keeping a single hyperthread per physical core
    pub fn real_cpuset(&self) -> &CpuSet {
        &self.real_cpuset
    }

    /// Number of hyperthreads per physical core
    pub fn core_siblings(&self) -> usize {
        self.core_siblings
    }

    /// Number of online CPUs
    pub fn online_cpu_count(&self) -> usize {
        self.topology.online_cpu_count()
    }

    /// Number of online NUMA nodes
    pub fn online_node_count(&self) -> usize {
        self.topology.online_node_count()
    }

    /// Number of NUMA nodes that could ever be brought online
    pub fn possible_node_count(&self) -> usize {
        self.topology.possible_node_count()
    }

    /// Number of devices that were enumerated on NUMA node `node`
    pub fn devices_on_node(&self, node: usize) -> usize {
        self.devices_per_node.get(&node).copied().unwrap_or(0)
    }
}

/// # Inspection
impl AffinityRegistry {
    /// NUMA nodes where a device attached, and whose interrupt CPU pools
    /// are therefore set up
    pub fn attached_nodes(&self) -> NodeSet {
        self.state.lock().entries.keys().collect()
    }

    /// Snapshot of the interrupt CPU pools of NUMA node `node`
    ///
    /// Returns `None` if no device attached on this node yet.
    pub fn node_entry(&self, node: usize) -> Option<NodeAffinityEntry> {
        self.state.lock().entries.get(&node).cloned()
    }

    /// Snapshot of the pool of CPUs recommended to processes
    pub fn process_pool(&self) -> AllocatablePool {
        self.state.lock().process_pool.clone()
    }
}

/// Keep one hyperthread per physical core among the online CPUs
///
/// If the first online CPU has `ht` hyperthreads and there are `n` online
/// CPUs, the `n / ht` lowest online CPUs are kept. This matches the usual x86
/// Linux numbering where the first hyperthread of every core comes first.
fn compute_real_cpuset(topology: &Topology) -> CpuSet {
    let online = topology.online_cpuset();
    let hyperthreads = online
        .first_set()
        .and_then(|first| topology.siblings(first))
        .map_or(1, |siblings| siblings.weight().max(1));
    online.lowest(online.weight() / hyperthreads)
}
