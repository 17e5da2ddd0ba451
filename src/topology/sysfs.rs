//! Topology discovery from Linux sysfs
//!
//! The kernel exposes the CPU and NUMA topology as small text files using the
//! CPU list syntax. Reading them from an arbitrary root directory, rather
//! than hardcoding `/sys`, lets tests run discovery against a fake tree.

use super::builder::{TopologyBuilder, TopologyError};
use crate::{bitmap::ParseBitmapError, cpu::cpuset::CpuSet, memory::nodeset::NodeSet};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// # Discovery from sysfs
impl TopologyBuilder {
    /// Describe the machine exposed by a sysfs tree mounted at `root`
    ///
    /// The following files are read, relative to `root`:
    ///
    /// - `devices/system/cpu/online` for the set of online CPUs
    /// - `devices/system/cpu/cpu<N>/topology/thread_siblings_list` for the
    ///   hyperthread siblings of each CPU. CPUs without this file are
    ///   treated as single-threaded cores.
    /// - `devices/system/node/node<N>/cpulist` for the local CPUs of each
    ///   NUMA node. Without a `devices/system/node` directory, the machine is
    ///   treated as a single node 0.
    /// - `devices/system/node/possible`, if present, for the possible node
    ///   count
    ///
    /// Online CPUs that no node claims are attached to the lowest node.
    ///
    /// # Errors
    ///
    /// - [`SysfsError`] if a required file could not be read or parsed
    pub fn from_sysfs(root: impl AsRef<Path>) -> Result<Self, SysfsError> {
        let system = root.as_ref().join("devices/system");
        let online = read_list::<CpuSet>(&system.join("cpu/online"))?;

        let mut builder = Self::new();
        let mut claimed = CpuSet::new();
        for cpu in &online {
            if claimed.is_set(cpu) {
                continue;
            }
            let path = system.join(format!("cpu/cpu{cpu}/topology/thread_siblings_list"));
            let mut siblings = match read_list::<CpuSet>(&path) {
                Ok(siblings) => siblings & &online,
                Err(SysfsError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    CpuSet::from(cpu)
                }
                Err(other) => return Err(other),
            };
            siblings -= &claimed;
            siblings.set(cpu);
            claimed |= &siblings;
            builder = builder.with_core(siblings);
        }

        let node_dir = system.join("node");
        let mut nodes = BTreeMap::new();
        if node_dir.is_dir() {
            let entries = fs::read_dir(&node_dir).map_err(|source| SysfsError::Io {
                path: node_dir.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| SysfsError::Io {
                    path: node_dir.clone(),
                    source,
                })?;
                let name = entry.file_name();
                let Some(node) = name
                    .to_str()
                    .and_then(|name| name.strip_prefix("node"))
                    .and_then(|id| id.parse::<usize>().ok())
                else {
                    continue;
                };
                let cpus = read_list::<CpuSet>(&entry.path().join("cpulist"))?;
                nodes.insert(node, cpus & &online);
            }

            let possible_path = node_dir.join("possible");
            if possible_path.is_file() {
                let possible = read_list::<NodeSet>(&possible_path)?;
                builder = builder.with_possible_nodes(possible.last_set().map_or(0, |n| n + 1));
            }
        }

        let mut unclaimed = online;
        for cpus in nodes.values() {
            unclaimed -= cpus;
        }
        if !unclaimed.is_empty() {
            let first_node = nodes.keys().next().copied().unwrap_or(0);
            *nodes.entry(first_node).or_default() |= unclaimed;
        }
        for (node, cpus) in nodes {
            builder = builder.with_node(node, cpus);
        }
        Ok(builder)
    }
}

/// Read a sysfs file in CPU or node list format
fn read_list<Set: FromStr<Err = ParseBitmapError>>(path: &Path) -> Result<Set, SysfsError> {
    let text = fs::read_to_string(path).map_err(|source| SysfsError::Io {
        path: path.to_owned(),
        source,
    })?;
    text.parse().map_err(|source| SysfsError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Error returned when topology discovery from sysfs fails
#[derive(Debug, Error)]
pub enum SysfsError {
    /// A sysfs file or directory could not be read
    #[error("failed to read {path:?}")]
    Io {
        /// Path that could not be read
        path: PathBuf,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A sysfs file did not contain a valid CPU list
    #[error("failed to parse {path:?}")]
    Parse {
        /// Path whose contents could not be parsed
        path: PathBuf,

        /// Underlying parse error
        #[source]
        source: ParseBitmapError,
    },

    /// The discovered topology is inconsistent
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)]
    use similar_asserts::assert_eq;
    use tempfile::TempDir;

    /// Write a file of a fake sysfs tree, creating parent directories
    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Fake sysfs tree of a 2-node machine with 2 hyperthreaded cores/node
    fn two_node_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "devices/system/cpu/online", "0-7\n");
        for cpu in 0..8 {
            let siblings = format!("{},{}\n", cpu % 4, cpu % 4 + 4);
            write(
                root,
                &format!("devices/system/cpu/cpu{cpu}/topology/thread_siblings_list"),
                &siblings,
            );
        }
        write(root, "devices/system/node/possible", "0-3\n");
        write(root, "devices/system/node/online", "0-1\n");
        write(root, "devices/system/node/node0/cpulist", "0-1,4-5\n");
        write(root, "devices/system/node/node1/cpulist", "2-3,6-7\n");
        dir
    }

    #[test]
    fn two_nodes() {
        let dir = two_node_tree();
        let topology = TopologyBuilder::from_sysfs(dir.path())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_cpu_count(), 8);
        assert_eq!(topology.online_node_count(), 2);
        assert_eq!(topology.possible_node_count(), 4);
        assert_eq!(topology.siblings(6).unwrap().to_string(), "2,6");
        assert_eq!(topology.node_of_cpu(5), Some(0));
        assert_eq!(topology.node_cpuset(1).unwrap().to_string(), "2-3,6-7");
    }

    #[test]
    fn without_node_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "devices/system/cpu/online", "0-3\n");
        let topology = TopologyBuilder::from_sysfs(dir.path())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_node_count(), 1);
        assert_eq!(topology.node_cpuset(0), Some(&CpuSet::from_range(0..4)));
        assert_eq!(topology.siblings(2), Some(&CpuSet::from(2)));
    }

    #[test]
    fn offline_cpus_are_ignored() {
        let dir = two_node_tree();
        write(dir.path(), "devices/system/cpu/online", "0-3\n");
        let topology = TopologyBuilder::from_sysfs(dir.path())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(topology.online_cpuset(), &CpuSet::from_range(0..4));
        assert_eq!(topology.siblings(1), Some(&CpuSet::from(1)));
        assert_eq!(topology.node_cpuset(1).unwrap().to_string(), "2-3");
    }

    #[test]
    fn errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TopologyBuilder::from_sysfs(dir.path()),
            Err(SysfsError::Io { .. })
        ));
        write(dir.path(), "devices/system/cpu/online", "garbage\n");
        assert!(matches!(
            TopologyBuilder::from_sysfs(dir.path()),
            Err(SysfsError::Parse { .. })
        ));
    }
}
