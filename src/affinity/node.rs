//! Per-NUMA-node interrupt CPU partitioning

use super::{
    pool::{AllocatablePool, PoolKind},
    AffinityRegistry,
};
use crate::cpu::cpuset::CpuSet;

/// Interrupt CPU pools of a NUMA node
///
/// An entry is created the first time a device homed on its node attaches,
/// and is then shared by every device on that node. The node's real CPUs
/// are split into three roles:
///
/// - The lowest CPU handles the general interrupt and the control receive
///   context of every device.
/// - The next CPUs form the receive pool, for the other kernel receive
///   contexts.
/// - The rest form the default pool, for DMA engine interrupts.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NodeAffinityEntry {
    /// NUMA node that this entry describes
    node: usize,

    /// Pool of DMA engine interrupt CPUs
    default_pool: AllocatablePool,

    /// Pool of receive context interrupt CPUs
    receive_pool: AllocatablePool,

    /// CPU of the general interrupt and control contexts
    general_cpu: usize,
}

impl NodeAffinityEntry {
    /// Split `candidates` into the three interrupt roles
    ///
    /// `receive_cpus` CPUs are set aside for the receive pool, or fewer if
    /// `candidates` runs out. Returns `None` if `candidates` is empty.
    pub(crate) fn partition(node: usize, candidates: &CpuSet, receive_cpus: usize) -> Option<Self> {
        let general_cpu = candidates.first_set()?;
        let general_mask = CpuSet::from(general_cpu);
        if candidates.weight() == 1 {
            return Some(Self {
                node,
                default_pool: AllocatablePool::new(general_mask.clone()),
                receive_pool: AllocatablePool::new(general_mask),
                general_cpu,
            });
        }

        let mut default_mask = candidates - &general_mask;
        let receive_mask = default_mask.lowest(receive_cpus);
        default_mask -= &receive_mask;
        if default_mask.is_empty() {
            default_mask = general_mask;
        }
        Some(Self {
            node,
            default_pool: AllocatablePool::new(default_mask),
            receive_pool: AllocatablePool::new(receive_mask),
            general_cpu,
        })
    }

    /// NUMA node that this entry describes
    pub fn node(&self) -> usize {
        self.node
    }

    /// Pool of DMA engine interrupt CPUs
    pub fn default_pool(&self) -> &AllocatablePool {
        &self.default_pool
    }

    /// Pool of receive context interrupt CPUs
    pub fn receive_pool(&self) -> &AllocatablePool {
        &self.receive_pool
    }

    /// CPU of the general interrupt and control contexts
    pub fn general_cpu(&self) -> usize {
        self.general_cpu
    }

    /// Single-CPU mask of [`general_cpu()`](Self::general_cpu)
    pub fn general_mask(&self) -> CpuSet {
        CpuSet::from(self.general_cpu)
    }

    /// CPUs that interrupt handlers of this node should be assumed to run on
    pub fn interrupt_cpus(&self) -> CpuSet {
        self.default_pool.occupied() | self.receive_pool.occupied() | self.general_mask()
    }

    /// Mutable access to the pool of DMA engine interrupt CPUs
    pub(crate) fn default_pool_mut(&mut self) -> &mut AllocatablePool {
        &mut self.default_pool
    }

    /// Mutable access to the interrupt pool of a given kind
    ///
    /// Returns `None` for [`PoolKind::Process`], which is not per-node.
    pub(crate) fn pool_mut(&mut self, kind: PoolKind) -> Option<&mut AllocatablePool> {
        match kind {
            PoolKind::Default => Some(&mut self.default_pool),
            PoolKind::Receive => Some(&mut self.receive_pool),
            PoolKind::Process => None,
        }
    }
}

/// # Device attachment helpers
impl AffinityRegistry {
    /// CPUs that interrupts of devices homed on `node` may be steered to
    ///
    /// These are the real CPUs of the node. A node without local CPUs borrows
    /// the core of the first online CPU, and if no real CPU is local to the
    /// node, all of its local CPUs are used.
    pub(crate) fn attach_candidates(&self, node: usize) -> CpuSet {
        let local = self
            .topology
            .node_cpuset(node)
            .filter(|cpus| !cpus.is_empty())
            .or_else(|| {
                let first = self.topology.online_cpuset().first_set()?;
                self.topology.siblings(first)
            })
            .cloned()
            .unwrap_or_default();
        let real = &self.real_cpuset & &local;
        if real.is_empty() {
            local
        } else {
            real
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::builder::TopologyBuilder;
    #[allow(unused)]
    use similar_asserts::assert_eq;

    fn cpus(list: &str) -> CpuSet {
        list.parse().unwrap()
    }

    #[test]
    fn partition() {
        let entry = NodeAffinityEntry::partition(0, &cpus("2,4,6,8"), 1).unwrap();
        assert_eq!(entry.node(), 0);
        assert_eq!(entry.general_mask(), cpus("2"));
        assert_eq!(entry.receive_pool().mask(), &cpus("4"));
        assert_eq!(entry.default_pool().mask(), &cpus("6,8"));
        assert_eq!(entry.interrupt_cpus(), cpus("2"));
    }

    #[test]
    fn single_cpu_node() {
        let entry = NodeAffinityEntry::partition(3, &cpus("5"), 6).unwrap();
        assert_eq!(entry.general_cpu(), 5);
        assert_eq!(entry.receive_pool().mask(), &cpus("5"));
        assert_eq!(entry.default_pool().mask(), &cpus("5"));
    }

    #[test]
    fn default_pool_falls_back_to_general_cpu() {
        let entry = NodeAffinityEntry::partition(0, &cpus("0-3"), 3).unwrap();
        assert_eq!(entry.receive_pool().mask(), &cpus("1-3"));
        assert_eq!(entry.default_pool().mask(), &cpus("0"));

        // Receive CPUs beyond the node's capacity are silently dropped
        let entry = NodeAffinityEntry::partition(0, &cpus("0-3"), 10).unwrap();
        assert_eq!(entry.receive_pool().mask(), &cpus("1-3"));
        assert_eq!(entry.default_pool().mask(), &cpus("0"));
    }

    #[test]
    fn without_receive_queues() {
        let entry = NodeAffinityEntry::partition(0, &cpus("0-3"), 0).unwrap();
        assert!(entry.receive_pool().mask().is_empty());
        assert_eq!(entry.default_pool().mask(), &cpus("1-3"));
        assert!(NodeAffinityEntry::partition(0, &CpuSet::new(), 1).is_none());
    }

    #[test]
    fn interrupt_cpus_follow_generations() {
        let mut entry = NodeAffinityEntry::partition(0, &cpus("0-5"), 2).unwrap();
        assert!(entry.pool_mut(PoolKind::Process).is_none());
        let mut allocate = |kind| entry.pool_mut(kind).unwrap().allocate();
        assert_eq!(allocate(PoolKind::Receive), Some(1));
        assert_eq!(allocate(PoolKind::Default), Some(3));
        // Once the receive pool wraps, all of it counts as busy
        allocate(PoolKind::Receive);
        allocate(PoolKind::Receive);
        assert_eq!(entry.receive_pool().generation(), 1);
        assert_eq!(entry.interrupt_cpus(), cpus("0-3"));

        let mut fresh = NodeAffinityEntry::partition(0, &cpus("0-5"), 2).unwrap();
        fresh.pool_mut(PoolKind::Receive).unwrap().allocate();
        fresh.pool_mut(PoolKind::Default).unwrap().allocate();
        assert_eq!(fresh.interrupt_cpus(), cpus("0-1,3"));
    }

    #[test]
    fn candidates() {
        // Hyperthread siblings 8-15 are not real CPUs
        let topology = TopologyBuilder::from_synthetic("node:2 core:4 pu:2")
            .unwrap()
            .build()
            .unwrap();
        let registry = AffinityRegistry::new(topology, []);
        assert_eq!(registry.attach_candidates(0), cpus("0-3"));
        assert_eq!(registry.attach_candidates(1), cpus("4-7"));

        // Memory-only nodes borrow the first core
        let topology = TopologyBuilder::new()
            .with_node(0, cpus("0-3"))
            .with_node(1, CpuSet::new())
            .with_core(cpus("0,2"))
            .with_core(cpus("1,3"))
            .build()
            .unwrap();
        let registry = AffinityRegistry::new(topology, []);
        assert_eq!(registry.real_cpuset(), &cpus("0-1"));
        assert_eq!(registry.attach_candidates(1), cpus("0"));
        assert_eq!(registry.attach_candidates(7), cpus("0"));

        // Nodes holding only hyperthread siblings keep their siblings
        let topology = TopologyBuilder::new()
            .with_node(0, cpus("0-1"))
            .with_node(1, cpus("2-3"))
            .with_core(cpus("0,2"))
            .with_core(cpus("1,3"))
            .build()
            .unwrap();
        let registry = AffinityRegistry::new(topology, []);
        assert_eq!(registry.attach_candidates(1), cpus("2-3"));
    }
}
