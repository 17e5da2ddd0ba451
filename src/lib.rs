//! NUMA and hyperthread aware CPU placement for device interrupts
//!
//! This crate decides which logical CPU each interrupt of a multi-queue
//! device is steered to, and which CPU user processes that open device
//! contexts should run on. Placements spread load over the machine: they
//! prefer the device's NUMA node, keep processes away from the CPUs that
//! handle interrupts, and only reuse a CPU once all others have been handed
//! out.
//!
//! # Usage
//!
//! Describe the machine with a [`Topology`], either discovered from the host
//! with [`Topology::from_host()`] or built by hand, then share a single
//! [`AffinityRegistry`] between every device and process:
//!
//! ```
//! use irqlocality::{
//!     affinity::{
//!         irq::{DeviceConfig, InterruptHost, IrqSource, IrqVector},
//!         process::ProcessAdvice,
//!         AffinityRegistry,
//!     },
//!     cpu::cpuset::CpuSet,
//!     topology::builder::TopologyBuilder,
//! };
//!
//! /// Interrupt layer of a device, which would apply affinity hints
//! struct Host;
//! //
//! impl InterruptHost for Host {
//!     type Error = std::convert::Infallible;
//!
//!     fn set_affinity_hint(&mut self, vector: u32, hint: Option<&CpuSet>) {
//!         println!("IRQ {vector} -> {hint:?}");
//!     }
//!
//!     fn register_reassign_listener(&mut self, _vector: u32) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     fn unregister_reassign_listener(&mut self, _vector: u32) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! // Two NUMA nodes of four hyperthreaded cores, one device on node 0
//! let topology = TopologyBuilder::from_synthetic("node:2 core:4 pu:2")?.build()?;
//! let registry = AffinityRegistry::new(topology, [Some(0)]);
//!
//! let config = DeviceConfig {
//!     node_hint: Some(0),
//!     receive_queue_count: 2,
//! };
//! let mut device = registry.attach_device(Host, config)?;
//! let dma = IrqVector::new(42, IrqSource::Dma { engine: 0 });
//! assert_eq!(registry.acquire_irq(&mut device, dma)?, 2);
//!
//! let everywhere = registry.topology().online_cpuset().clone();
//! let advice = registry.advise_process_cpu(0, &everywhere)?;
//! assert_eq!(advice, ProcessAdvice::Assigned(1));
//! # Ok::<(), eyre::Report>(())
//! ```

pub mod affinity;
pub mod bitmap;
pub mod cpu;
pub mod errors;
pub mod memory;
#[cfg(any(test, feature = "proptest"))]
pub(crate) mod strategies;
pub mod topology;

#[cfg(doc)]
use crate::{affinity::AffinityRegistry, topology::Topology};
