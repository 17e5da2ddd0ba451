//! Memory-specific functionality
//!
//! The module only hosts the NUMA node set type, which is used to describe
//! the memory locality of a [`Topology`].
//!
//! [`Topology`]: crate::topology::Topology

pub mod nodeset;
