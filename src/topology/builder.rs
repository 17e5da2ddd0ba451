//! Building a topology with a custom configuration
//!
//! A [`Topology`] is immutable once built. This module implements the
//! familiar builder pattern that is used to describe the machine beforehand,
//! either piece by piece or from a synthetic description string.

use super::Topology;
use crate::{bitmap::MAX_LIST_INDEX, cpu::cpuset::CpuSet};
use std::collections::BTreeMap;
use thiserror::Error;

/// Mechanism to build a `Topology` with custom configuration
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TopologyBuilder {
    /// Local CPUs of each NUMA node
    nodes: BTreeMap<usize, CpuSet>,

    /// Explicitly declared hyperthread sibling groups
    cores: Vec<CpuSet>,

    /// Explicitly declared number of possible NUMA nodes
    possible_nodes: Option<usize>,
}

/// # Topology building
impl TopologyBuilder {
    /// Start building a [`Topology`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an online NUMA node and its local CPUs
    ///
    /// Every CPU of the topology must be declared local to exactly one node.
    /// Declaring the same node twice merges the CPU sets. An empty CPU set
    /// declares a memory-only node.
    pub fn with_node(mut self, node: usize, cpus: CpuSet) -> Self {
        *self.nodes.entry(node).or_default() |= cpus;
        self
    }

    /// Declare a physical core, i.e. a group of hyperthread siblings
    ///
    /// CPUs that are not part of any declared core are assumed to be
    /// single-threaded cores. Siblings that are not local to any node are
    /// considered offline and ignored.
    pub fn with_core(mut self, siblings: CpuSet) -> Self {
        self.cores.push(siblings);
        self
    }

    /// Declare how many NUMA nodes could ever be brought online
    ///
    /// This is clamped to at least the number of node ids needed to index
    /// every online node. By default, that minimum is used.
    pub fn with_possible_nodes(mut self, count: usize) -> Self {
        self.possible_nodes = Some(count);
        self
    }

    /// Describe a symmetric machine using a synthetic description
    ///
    /// The description is a whitespace-separated list of `level:arity` items,
    /// from the outermost to the innermost level, among `node` (alias
    /// `numa`), `core` and `pu`. Omitted levels have an arity of 1.
    ///
    /// Logical CPUs are numbered the way x86 Linux machines usually are, with
    /// the first hyperthread of every core first and their siblings after
    /// that: the CPU index of hyperthread `pu` of core `core` of node `node`
    /// is `pu * (nodes * cores) + node * cores + core`.
    ///
    /// # Examples
    ///
    /// ```
    /// use irqlocality::topology::builder::TopologyBuilder;
    ///
    /// let topology = TopologyBuilder::from_synthetic("node:2 core:4 pu:2")?.build()?;
    /// assert_eq!(topology.online_cpu_count(), 16);
    /// assert_eq!(topology.siblings(0).unwrap().to_string(), "0,8");
    /// assert_eq!(topology.node_cpuset(1).unwrap().to_string(), "4-7,12-15");
    /// # Ok::<(), eyre::Report>(())
    /// ```
    ///
    /// # Errors
    ///
    /// - [`SyntheticError`] if the description is not valid
    pub fn from_synthetic(description: &str) -> Result<Self, SyntheticError> {
        // Arity of the node, core and pu levels, in this order
        let mut arities = [None; 3];
        let mut last_level = None;
        for item in description.split_whitespace() {
            let (name, arity) = item
                .split_once(':')
                .ok_or_else(|| SyntheticError::BadItem(item.to_owned()))?;
            let level = match name {
                "node" | "numa" => 0,
                "core" => 1,
                "pu" => 2,
                _ => return Err(SyntheticError::UnknownLevel(name.to_owned())),
            };
            if last_level.is_some_and(|last| last >= level) {
                return Err(SyntheticError::MisplacedLevel(name.to_owned()));
            }
            last_level = Some(level);
            let arity = arity
                .parse::<usize>()
                .ok()
                .filter(|&arity| arity > 0)
                .ok_or_else(|| SyntheticError::BadItem(item.to_owned()))?;
            arities[level] = Some(arity);
        }
        if last_level.is_none() {
            return Err(SyntheticError::Empty);
        }
        let [nodes, cores, pus] = arities.map(|arity| arity.unwrap_or(1));

        let first_bank = nodes
            .checked_mul(cores)
            .filter(|first_bank| {
                first_bank
                    .checked_mul(pus)
                    .is_some_and(|cpus| cpus <= MAX_LIST_INDEX + 1)
            })
            .ok_or_else(|| SyntheticError::BadItem(description.trim().to_owned()))?;
        let cpu = |node: usize, core: usize, pu: usize| pu * first_bank + node * cores + core;
        let mut builder = Self::new();
        for node in 0..nodes {
            let mut node_cpus = CpuSet::new();
            for core in 0..cores {
                let siblings = (0..pus).map(|pu| cpu(node, core, pu)).collect::<CpuSet>();
                node_cpus |= &siblings;
                builder = builder.with_core(siblings);
            }
            builder = builder.with_node(node, node_cpus);
        }
        Ok(builder)
    }

    /// Check the configuration and build the [`Topology`]
    ///
    /// # Errors
    ///
    /// - [`NoCpu`] if no node has any local CPU
    /// - [`CpuInSeveralNodes`] if a CPU was declared local to two nodes
    /// - [`CpuInSeveralCores`] if a CPU was declared part of two cores
    ///
    /// [`NoCpu`]: TopologyError::NoCpu
    /// [`CpuInSeveralNodes`]: TopologyError::CpuInSeveralNodes
    /// [`CpuInSeveralCores`]: TopologyError::CpuInSeveralCores
    pub fn build(self) -> Result<Topology, TopologyError> {
        let mut online = CpuSet::new();
        for cpus in self.nodes.values() {
            if let Some(cpu) = (&online & cpus).first_set() {
                return Err(TopologyError::CpuInSeveralNodes(cpu));
            }
            online |= cpus;
        }
        if online.is_empty() {
            return Err(TopologyError::NoCpu);
        }

        let mut covered = CpuSet::new();
        let mut cores = Vec::with_capacity(self.cores.len());
        for core in self.cores {
            let core = core & &online;
            if let Some(cpu) = (&covered & &core).first_set() {
                return Err(TopologyError::CpuInSeveralCores(cpu));
            }
            if !core.is_empty() {
                covered |= &core;
                cores.push(core);
            }
        }
        cores.extend((&online - &covered).iter_set().map(CpuSet::from));
        cores.sort_by_key(|core| core.first_set());

        let min_possible = self.nodes.keys().last().map_or(0, |&last| last + 1);
        let possible_nodes = self.possible_nodes.unwrap_or(0).max(min_possible);
        Ok(Topology::from_parts(self.nodes, cores, possible_nodes))
    }
}

/// Error returned when a [`TopologyBuilder`] holds an invalid configuration
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum TopologyError {
    /// No NUMA node has a local CPU
    #[error("topology has no online CPU")]
    NoCpu,

    /// A CPU was declared local to more than one NUMA node
    #[error("CPU {0} is local to several NUMA nodes")]
    CpuInSeveralNodes(usize),

    /// A CPU was declared part of more than one physical core
    #[error("CPU {0} belongs to several cores")]
    CpuInSeveralCores(usize),
}

/// Error returned when a synthetic topology description is invalid
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum SyntheticError {
    /// The description has no item
    #[error("synthetic description is empty")]
    Empty,

    /// An item is not of the form `level:arity` with a positive arity, or
    /// the whole description has more CPUs than [`MAX_LIST_INDEX`] allows
    #[error("{0:?} is not a valid level:arity item")]
    BadItem(String),

    /// An item names a level that does not exist
    #[error("unknown synthetic level {0:?}, expected node, core or pu")]
    UnknownLevel(String),

    /// A level is repeated, or appears after a level it contains
    #[error("synthetic level {0:?} is duplicated or out of order")]
    MisplacedLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)]
    use similar_asserts::assert_eq;

    #[test]
    fn synthetic_numbering() {
        let topology = TopologyBuilder::from_synthetic("node:2 core:3 pu:2")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_cpu_count(), 12);
        assert_eq!(topology.node_cpuset(0).unwrap().to_string(), "0-2,6-8");
        assert_eq!(topology.node_cpuset(1).unwrap().to_string(), "3-5,9-11");
        assert_eq!(topology.siblings(4).unwrap().to_string(), "4,10");
        assert_eq!(topology.siblings(10).unwrap().to_string(), "4,10");
    }

    #[test]
    fn synthetic_defaults() {
        let topology = TopologyBuilder::from_synthetic("core:4")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_node_count(), 1);
        assert_eq!(topology.node_cpuset(0), Some(&CpuSet::from_range(0..4)));
        assert!((0..4).all(|cpu| topology.siblings(cpu) == Some(&CpuSet::from(cpu))));

        let single = TopologyBuilder::from_synthetic("numa:1").unwrap().build().unwrap();
        assert_eq!(single.online_cpuset(), &CpuSet::from(0));
    }

    #[test]
    fn synthetic_errors() {
        assert_eq!(TopologyBuilder::from_synthetic(" "), Err(SyntheticError::Empty));
        assert_eq!(
            TopologyBuilder::from_synthetic("core"),
            Err(SyntheticError::BadItem("core".to_owned()))
        );
        assert_eq!(
            TopologyBuilder::from_synthetic("core:0"),
            Err(SyntheticError::BadItem("core:0".to_owned()))
        );
        assert_eq!(
            TopologyBuilder::from_synthetic("package:2"),
            Err(SyntheticError::UnknownLevel("package".to_owned()))
        );
        assert_eq!(
            TopologyBuilder::from_synthetic("core:2 node:2"),
            Err(SyntheticError::MisplacedLevel("node".to_owned()))
        );
        assert_eq!(
            TopologyBuilder::from_synthetic("core:2 core:2"),
            Err(SyntheticError::MisplacedLevel("core".to_owned()))
        );
        let huge = format!("node:{0} core:{0}", usize::MAX);
        assert_eq!(
            TopologyBuilder::from_synthetic(&huge),
            Err(SyntheticError::BadItem(huge.clone()))
        );
    }

    #[test]
    fn manual_build() {
        let topology = TopologyBuilder::new()
            .with_node(0, [0, 1].iter().collect())
            .with_node(3, [4, 5].iter().collect())
            .with_node(1, CpuSet::new())
            .with_core([0, 4].iter().collect())
            // Offline sibling 9 is dropped
            .with_core([1, 9].iter().collect())
            .build()
            .unwrap();
        assert_eq!(topology.online_cpuset().to_string(), "0-1,4-5");
        assert_eq!(topology.online_node_count(), 3);
        assert_eq!(topology.possible_node_count(), 4);
        assert_eq!(topology.node_cpuset(1), Some(&CpuSet::new()));
        assert_eq!(topology.siblings(4).unwrap().to_string(), "0,4");
        assert_eq!(topology.siblings(1), Some(&CpuSet::from(1)));
        assert_eq!(topology.siblings(5), Some(&CpuSet::from(5)));
        assert_eq!(
            topology
                .cores()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            "0,4 1 5"
        );

        let padded = TopologyBuilder::new()
            .with_node(0, CpuSet::from(0))
            .with_possible_nodes(8)
            .build()
            .unwrap();
        assert_eq!(padded.possible_node_count(), 8);
    }

    #[test]
    fn build_errors() {
        assert_eq!(TopologyBuilder::new().build(), Err(TopologyError::NoCpu));
        assert_eq!(
            TopologyBuilder::new()
                .with_node(0, CpuSet::new())
                .build(),
            Err(TopologyError::NoCpu)
        );
        assert_eq!(
            TopologyBuilder::new()
                .with_node(0, CpuSet::from_range(0..2))
                .with_node(1, CpuSet::from_range(1..3))
                .build(),
            Err(TopologyError::CpuInSeveralNodes(1))
        );
        assert_eq!(
            TopologyBuilder::new()
                .with_node(0, CpuSet::from_range(0..4))
                .with_core(CpuSet::from_range(0..2))
                .with_core(CpuSet::from_range(1..3))
                .build(),
            Err(TopologyError::CpuInSeveralCores(1))
        );
    }
}
