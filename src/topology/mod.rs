//! Hardware topology
//!
//! A [`Topology`] is an immutable snapshot of the machine shape that the
//! allocator reasons about: which logical CPUs are online, how they group
//! into hyperthreaded cores, and which NUMA node each of them is local to.
//!
//! Topologies can be assembled by hand with a [`TopologyBuilder`], generated
//! from a compact synthetic description, or discovered from Linux sysfs.

pub mod builder;
pub mod sysfs;

use self::builder::TopologyBuilder;
use crate::{cpu::cpuset::CpuSet, memory::nodeset::NodeSet};
use std::collections::BTreeMap;

/// Shape of the machine that CPUs are allocated from
///
/// Since there are several things you can query from a `Topology`, the API
/// is broken down into sections:
///
/// - [Topology building](#topology-building)
/// - [CPUs and cores](#cpus-and-cores)
/// - [NUMA nodes](#numa-nodes)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topology {
    /// Online CPUs
    online: CpuSet,

    /// Hyperthread sibling groups, one per physical core
    cores: Vec<CpuSet>,

    /// Index of each online CPU's core within `cores`
    core_of_cpu: BTreeMap<usize, usize>,

    /// Local CPUs of each online NUMA node (possibly empty)
    nodes: BTreeMap<usize, CpuSet>,

    /// NUMA node of each online CPU
    node_of_cpu: BTreeMap<usize, usize>,

    /// Number of NUMA nodes that could ever be brought online
    possible_nodes: usize,
}

/// # Topology building
impl Topology {
    /// Prepare to create a `Topology` with custom configuration
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::new()
    }

    /// Discover the topology of the machine we are running on
    ///
    /// # Errors
    ///
    /// - [`SysfsError`] if `/sys` could not be read or parsed
    ///
    /// [`SysfsError`]: sysfs::SysfsError
    #[cfg(target_os = "linux")]
    pub fn from_host() -> Result<Self, sysfs::SysfsError> {
        Ok(TopologyBuilder::from_sysfs("/sys")?.build()?)
    }

    /// Assemble a topology from validated parts, see [`TopologyBuilder::build()`]
    pub(crate) fn from_parts(
        nodes: BTreeMap<usize, CpuSet>,
        cores: Vec<CpuSet>,
        possible_nodes: usize,
    ) -> Self {
        let mut online = CpuSet::new();
        let mut node_of_cpu = BTreeMap::new();
        for (&node, cpus) in &nodes {
            online |= cpus;
            node_of_cpu.extend(cpus.iter_set().map(|cpu| (cpu, node)));
        }
        let core_of_cpu = cores
            .iter()
            .enumerate()
            .flat_map(|(idx, core)| core.iter_set().map(move |cpu| (cpu, idx)))
            .collect();
        Self {
            online,
            cores,
            core_of_cpu,
            nodes,
            node_of_cpu,
            possible_nodes,
        }
    }
}

/// # CPUs and cores
impl Topology {
    /// Set of online logical CPUs
    pub fn online_cpuset(&self) -> &CpuSet {
        &self.online
    }

    /// Number of online logical CPUs
    pub fn online_cpu_count(&self) -> usize {
        self.online.weight()
    }

    /// Hyperthread siblings of `cpu`, including `cpu` itself
    ///
    /// Returns `None` if `cpu` is not online.
    pub fn siblings(&self, cpu: usize) -> Option<&CpuSet> {
        self.core_of_cpu.get(&cpu).map(|&idx| &self.cores[idx])
    }

    /// Hyperthread sibling groups of all physical cores, ordered by lowest
    /// CPU index
    pub fn cores(&self) -> impl ExactSizeIterator<Item = &CpuSet> + '_ {
        self.cores.iter()
    }
}

/// # NUMA nodes
impl Topology {
    /// Set of online NUMA nodes
    ///
    /// This includes nodes without any local CPU, such as memory-only nodes.
    pub fn online_nodeset(&self) -> NodeSet {
        self.nodes.keys().collect()
    }

    /// Number of online NUMA nodes
    pub fn online_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of NUMA nodes that could ever be brought online
    pub fn possible_node_count(&self) -> usize {
        self.possible_nodes
    }

    /// Local CPUs of NUMA node `node`
    ///
    /// Returns `None` if the node is not online. Memory-only nodes return an
    /// empty set.
    pub fn node_cpuset(&self, node: usize) -> Option<&CpuSet> {
        self.nodes.get(&node)
    }

    /// NUMA node that `cpu` is local to, if `cpu` is online
    pub fn node_of_cpu(&self, cpu: usize) -> Option<usize> {
        self.node_of_cpu.get(&cpu).copied()
    }

    /// NUMA node of the CPU that the calling thread is running on
    ///
    /// If the OS cannot tell, or reports a CPU that this topology does not
    /// know about (e.g. a synthetic topology), the node of the first online
    /// CPU is returned instead.
    pub fn current_node(&self) -> usize {
        crate::cpu::binding::current_cpu()
            .and_then(|cpu| self.node_of_cpu(cpu))
            .or_else(|| self.online.first_set().and_then(|cpu| self.node_of_cpu(cpu)))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)]
    use similar_asserts::assert_eq;

    #[test]
    fn queries() {
        let topology = TopologyBuilder::from_synthetic("node:2 core:2 pu:2")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_cpuset(), &CpuSet::from_range(0..8));
        assert_eq!(topology.online_cpu_count(), 8);
        assert_eq!(topology.online_node_count(), 2);
        assert_eq!(topology.possible_node_count(), 2);
        assert_eq!(topology.online_nodeset(), NodeSet::from_range(0..2));
        assert_eq!(topology.cores().len(), 4);
        assert_eq!(topology.siblings(1).unwrap().to_string(), "1,5");
        assert_eq!(topology.siblings(8), None);
        assert_eq!(topology.node_cpuset(1).unwrap().to_string(), "2-3,6-7");
        assert_eq!(topology.node_cpuset(2), None);
        assert_eq!(topology.node_of_cpu(6), Some(1));
        assert_eq!(topology.node_of_cpu(8), None);
        assert!(topology.current_node() < 2);
    }
}
