//! Interrupt placement
//!
//! Devices attach to an [`AffinityRegistry`], which sets up the interrupt CPU
//! pools of their NUMA node, and then arm and disarm their interrupt vectors
//! through it. Each armed vector is steered to a single CPU, picked according
//! to the vector's [`IrqCategory`]:
//!
//! - The general interrupt and the control receive context go to the fixed
//!   general CPU of the node.
//! - Other receive contexts take turns over the node's receive pool.
//! - DMA engine interrupts take turns over the node's default pool, and can
//!   later be moved by the administrator, see
//!   [`AffinityRegistry::on_external_reassign()`].
//!
//! The OS side of interrupt steering is abstracted by the [`InterruptHost`]
//! trait, so that this logic can be driven by any interrupt layer.

use super::{
    node::NodeAffinityEntry,
    pool::PoolKind,
    AffinityRegistry, RegistryState,
};
use crate::{
    cpu::cpuset::CpuSet,
    errors::{AffinityError, ParameterError},
};
use std::{collections::BTreeMap, error::Error as StdError};
use strum::{Display, EnumIter};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Receive context that carries device control traffic
///
/// Interrupts of this context always go to the general CPU of the node.
pub const CONTROL_CONTEXT: u32 = 0;

/// Class of device interrupt, which decides where its CPU comes from
#[derive(Copy, Clone, Debug, Display, EnumIter, Eq, Hash, PartialEq)]
pub enum IrqCategory {
    /// DMA engine interrupt, placed from the default pool
    #[strum(serialize = "SDMA")]
    Dma,

    /// Receive context interrupt, placed from the receive pool unless it is
    /// the [`CONTROL_CONTEXT`]
    #[strum(serialize = "RCVCTXT")]
    Receive,

    /// General device interrupt, placed on the general CPU
    #[strum(serialize = "GENERAL")]
    General,

    /// Interrupt with no placement rule
    #[strum(serialize = "OTHER")]
    Other,
}

/// Device object that raises an interrupt
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum IrqSource {
    /// DMA engine number `engine`
    Dma {
        /// Engine index within the device
        engine: u32,
    },

    /// Receive context number `context`
    Receive {
        /// Context index within the device
        context: u32,
    },

    /// General device interrupt
    General,

    /// Interrupt that this crate does not know how to place
    Other,
}
//
impl IrqSource {
    /// Category of interrupts raised by this source
    pub fn category(&self) -> IrqCategory {
        match self {
            Self::Dma { .. } => IrqCategory::Dma,
            Self::Receive { .. } => IrqCategory::Receive,
            Self::General => IrqCategory::General,
            Self::Other => IrqCategory::Other,
        }
    }

    /// Pool that interrupts from this source are placed from, if any
    fn pool(&self) -> Option<PoolKind> {
        match self {
            Self::Dma { .. } => Some(PoolKind::Default),
            Self::Receive { context } if *context != CONTROL_CONTEXT => Some(PoolKind::Receive),
            Self::Receive { .. } | Self::General | Self::Other => None,
        }
    }
}

/// Interrupt vector of a device, along with what raises it
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct IrqVector {
    /// OS interrupt vector number
    pub vector: u32,

    /// Device object that raises this interrupt
    pub source: IrqSource,
}
//
impl IrqVector {
    /// Describe an interrupt vector
    pub fn new(vector: u32, source: IrqSource) -> Self {
        Self { vector, source }
    }

    /// Category of this interrupt
    pub fn category(&self) -> IrqCategory {
        self.source.category()
    }
}

/// OS interrupt layer that CPU placements are applied to
///
/// Methods take `&mut self` because the registry only calls them while the
/// owning [`Device`] is borrowed mutably.
pub trait InterruptHost {
    /// Error reported when listener (un)registration fails
    type Error: StdError;

    /// Set the affinity hint of interrupt `vector`, or clear it if `hint` is
    /// `None`
    fn set_affinity_hint(&mut self, vector: u32, hint: Option<&CpuSet>);

    /// Ask to be told when the administrator moves interrupt `vector`
    ///
    /// Notifications should be fed to
    /// [`AffinityRegistry::on_external_reassign()`].
    fn register_reassign_listener(&mut self, vector: u32) -> Result<(), Self::Error>;

    /// Undo [`register_reassign_listener()`](Self::register_reassign_listener)
    fn unregister_reassign_listener(&mut self, vector: u32) -> Result<(), Self::Error>;
}

/// Parameters of a device that attaches to the registry
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct DeviceConfig {
    /// NUMA node the device is attached to, if known
    ///
    /// If `None`, the node of the CPU that attaches the device is used.
    pub node_hint: Option<usize>,

    /// Number of kernel receive queues, including the control context
    pub receive_queue_count: usize,
}

/// Placement of an armed interrupt vector
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
struct ArmedVector {
    /// Device object that raises the interrupt
    source: IrqSource,

    /// CPU the interrupt is steered to
    cpu: usize,
}

/// Device attached to an [`AffinityRegistry`]
///
/// Tracks where each of the device's armed interrupt vectors is steered to.
#[derive(Debug)]
pub struct Device<H: InterruptHost> {
    /// NUMA node that the device's interrupts are placed on
    node: usize,

    /// OS interrupt layer of the device
    host: H,

    /// Armed interrupt vectors, keyed by vector number
    vectors: BTreeMap<u32, ArmedVector>,
}
//
impl<H: InterruptHost> Device<H> {
    /// NUMA node that the device's interrupts are placed on
    pub fn node(&self) -> usize {
        self.node
    }

    /// OS interrupt layer of the device
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the OS interrupt layer of the device
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// CPU that interrupt `vector` is steered to, if it is armed
    pub fn target_cpu(&self, vector: u32) -> Option<usize> {
        self.vectors.get(&vector).map(|armed| armed.cpu)
    }

    /// Armed interrupt vectors and the CPU each of them is steered to
    pub fn armed_vectors(&self) -> impl Iterator<Item = (IrqVector, usize)> + '_ {
        self.vectors
            .iter()
            .map(|(&vector, armed)| (IrqVector::new(vector, armed.source), armed.cpu))
    }

    /// Detach the device, giving back its interrupt layer
    ///
    /// Vectors should be released with [`AffinityRegistry::release_irq()`]
    /// beforehand, or their CPUs stay accounted as used.
    pub fn into_host(self) -> H {
        self.host
    }
}

/// Notification that the administrator moved an interrupt to another CPU
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ReassignNotice {
    /// Interrupt vector that was moved
    pub vector: u32,

    /// First CPU of the new affinity of the interrupt
    pub cpu: usize,
}

/// Reasons why an interrupt move was not applied to the CPU pools
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ReassignError {
    /// The vector is not armed on this device
    #[error("IRQ vector {0} is not armed on this device")]
    UnknownVector(u32),

    /// Only DMA engine interrupts are tracked after being moved
    #[error("IRQ vector {vector} has category {category}, only SDMA interrupts can be moved")]
    NotDma {
        /// Interrupt vector number
        vector: u32,

        /// Category of the vector
        category: IrqCategory,
    },

    /// The target CPU is not online
    #[error("IRQ vectors cannot be moved to an offline CPU")]
    OfflineCpu(#[from] ParameterError<usize>),

    /// The interrupt already targets this CPU
    #[error("IRQ vector {vector} already targets CPU {cpu}")]
    Unchanged {
        /// Interrupt vector number
        vector: u32,

        /// CPU that the vector targets
        cpu: usize,
    },

    /// The device's NUMA node has no affinity entry
    #[error("no affinity entry for NUMA node {0}")]
    NoEntryForNode(usize),
}

/// # Interrupt placement
impl AffinityRegistry {
    /// Attach a device, setting up the interrupt pools of its NUMA node
    ///
    /// The first device attached on a NUMA node decides how the node's real
    /// CPUs are split between the general CPU, the receive pool and the
    /// default pool. `receive_queue_count - 1` receive CPUs are set aside for
    /// every device that was enumerated on the node when the registry was
    /// created. Later devices on the same node share the existing pools.
    ///
    /// # Errors
    ///
    /// - [`AllocationFailure`] if no CPU could be found for the node
    ///
    /// [`AllocationFailure`]: AffinityError::AllocationFailure
    pub fn attach_device<H: InterruptHost>(
        &self,
        host: H,
        config: DeviceConfig,
    ) -> Result<Device<H>, AffinityError> {
        let node = config
            .node_hint
            .unwrap_or_else(|| self.topology.current_node());
        let mut state = self.state.lock();
        if !state.entries.contains_key(&node) {
            let candidates = self.attach_candidates(node);
            let receive_cpus = config.receive_queue_count.saturating_sub(1)
                * self.devices_on_node(node).max(1);
            let entry = NodeAffinityEntry::partition(node, &candidates, receive_cpus).ok_or(
                AffinityError::AllocationFailure {
                    node,
                    pool: PoolKind::Default,
                },
            )?;
            info!(
                node,
                general = entry.general_cpu(),
                receive = %entry.receive_pool().mask(),
                default = %entry.default_pool().mask(),
                "set up interrupt CPUs of NUMA node"
            );
            state.entries.insert(node, entry);
        }
        Ok(Device {
            node,
            host,
            vectors: BTreeMap::new(),
        })
    }

    /// Pick a CPU for an interrupt vector and steer the interrupt there
    ///
    /// If the vector is already armed, its previous CPU is released first.
    /// DMA engine vectors also get a reassignment listener. Failing to
    /// register it is logged but not fatal.
    ///
    /// # Errors
    ///
    /// - [`InvalidCategory`] if the vector is of [`IrqCategory::Other`]
    /// - [`NoEntryForNode`] if the device's node has no affinity entry
    /// - [`AllocationFailure`] if the pool of the vector has no CPU, which
    ///   happens when receive contexts beyond the control context are armed
    ///   on a device attached with a single receive queue
    ///
    /// [`AllocationFailure`]: AffinityError::AllocationFailure
    /// [`InvalidCategory`]: AffinityError::InvalidCategory
    /// [`NoEntryForNode`]: AffinityError::NoEntryForNode
    pub fn acquire_irq<H: InterruptHost>(
        &self,
        device: &mut Device<H>,
        irq: IrqVector,
    ) -> Result<usize, AffinityError> {
        if irq.source == IrqSource::Other {
            return Err(AffinityError::InvalidCategory {
                vector: irq.vector,
                category: irq.category(),
            });
        }

        let mut state = self.state.lock();
        if device.vectors.contains_key(&irq.vector) {
            Self::release_locked(&mut state, device, irq.vector)?;
        }
        let node = device.node;
        let entry = state
            .entries
            .get_mut(&node)
            .ok_or(AffinityError::NoEntryForNode(node))?;
        let cpu = match irq.source.pool() {
            Some(kind) => entry
                .pool_mut(kind)
                .and_then(|pool| pool.allocate())
                .ok_or(AffinityError::AllocationFailure { node, pool: kind })?,
            None => entry.general_cpu(),
        };

        device
            .host
            .set_affinity_hint(irq.vector, Some(&CpuSet::from(cpu)));
        match irq.source {
            IrqSource::Dma { engine } => {
                info!(vector = irq.vector, category = %irq.category(), engine, cpu, "placed IRQ");
                if let Err(error) = device.host.register_reassign_listener(irq.vector) {
                    warn!(vector = irq.vector, %error, "failed to register IRQ reassignment listener");
                }
            }
            IrqSource::Receive { context } => {
                info!(vector = irq.vector, category = %irq.category(), context, cpu, "placed IRQ");
            }
            IrqSource::General | IrqSource::Other => {
                info!(vector = irq.vector, category = %irq.category(), cpu, "placed IRQ");
            }
        }
        device.vectors.insert(
            irq.vector,
            ArmedVector {
                source: irq.source,
                cpu,
            },
        );
        Ok(cpu)
    }

    /// Give back the CPU of an interrupt vector and clear its affinity hint
    ///
    /// Releasing a vector that is not armed does nothing.
    ///
    /// # Errors
    ///
    /// - [`NoEntryForNode`] if the device's node has no affinity entry
    ///
    /// [`NoEntryForNode`]: AffinityError::NoEntryForNode
    pub fn release_irq<H: InterruptHost>(
        &self,
        device: &mut Device<H>,
        vector: u32,
    ) -> Result<(), AffinityError> {
        if !device.vectors.contains_key(&vector) {
            return Ok(());
        }
        let mut state = self.state.lock();
        Self::release_locked(&mut state, device, vector)
    }

    /// Implementation of [`release_irq()`](Self::release_irq) for armed
    /// vectors, with the registry lock held
    fn release_locked<H: InterruptHost>(
        state: &mut RegistryState,
        device: &mut Device<H>,
        vector: u32,
    ) -> Result<(), AffinityError> {
        let Some(armed) = device.vectors.get(&vector).copied() else {
            return Ok(());
        };
        let entry = state
            .entries
            .get_mut(&device.node)
            .ok_or(AffinityError::NoEntryForNode(device.node))?;
        if let Some(pool) = armed.source.pool().and_then(|kind| entry.pool_mut(kind)) {
            pool.release(armed.cpu);
        }
        if let IrqSource::Dma { .. } = armed.source {
            if let Err(error) = device.host.unregister_reassign_listener(vector) {
                warn!(vector, %error, "failed to unregister IRQ reassignment listener");
            }
        }
        device.host.set_affinity_hint(vector, None);
        device.vectors.remove(&vector);
        debug!(vector, cpu = armed.cpu, category = %armed.source.category(), "released IRQ");
        Ok(())
    }

    /// Account for the administrator moving a DMA engine interrupt
    ///
    /// The new CPU joins the node's default pool as a used CPU, and the old
    /// CPU leaves the pool unless another DMA engine vector of the device
    /// still targets it. Rejected notices are logged and otherwise ignored
    /// by the caller.
    ///
    /// # Errors
    ///
    /// - [`ReassignError`] if the notice does not describe a valid move
    pub fn on_external_reassign<H: InterruptHost>(
        &self,
        device: &mut Device<H>,
        notice: ReassignNotice,
    ) -> Result<(), ReassignError> {
        self.reassign(device, notice).map_err(|error| {
            warn!(vector = notice.vector, cpu = notice.cpu, %error, "ignored IRQ reassignment");
            error
        })
    }

    /// Implementation of [`on_external_reassign()`](Self::on_external_reassign)
    fn reassign<H: InterruptHost>(
        &self,
        device: &mut Device<H>,
        ReassignNotice { vector, cpu }: ReassignNotice,
    ) -> Result<(), ReassignError> {
        let armed = device
            .vectors
            .get_mut(&vector)
            .ok_or(ReassignError::UnknownVector(vector))?;
        if !matches!(armed.source, IrqSource::Dma { .. }) {
            return Err(ReassignError::NotDma {
                vector,
                category: armed.source.category(),
            });
        }
        if !self.topology.online_cpuset().is_set(cpu) {
            return Err(ParameterError(cpu).into());
        }
        let old_cpu = armed.cpu;
        if old_cpu == cpu {
            return Err(ReassignError::Unchanged { vector, cpu });
        }

        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(&device.node)
            .ok_or(ReassignError::NoEntryForNode(device.node))?;
        armed.cpu = cpu;
        device
            .host
            .set_affinity_hint(vector, Some(&CpuSet::from(cpu)));
        info!(vector, old_cpu, cpu, "IRQ moved by administrator");

        let pool = entry.default_pool_mut();
        pool.insert_used(cpu);
        let old_cpu_shared = device.vectors.iter().any(|(&other, armed)| {
            other != vector && matches!(armed.source, IrqSource::Dma { .. }) && armed.cpu == old_cpu
        });
        if !old_cpu_shared {
            pool.remove(old_cpu);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::builder::TopologyBuilder;
    #[allow(unused)]
    use similar_asserts::assert_eq;
    use std::collections::BTreeSet;
    use strum::IntoEnumIterator;

    /// Interrupt layer that records what it is asked to do
    #[derive(Debug, Default)]
    struct RecordingHost {
        hints: BTreeMap<u32, CpuSet>,
        listeners: BTreeSet<u32>,
        refuse_listeners: bool,
    }
    //
    impl InterruptHost for RecordingHost {
        type Error = std::io::Error;

        fn set_affinity_hint(&mut self, vector: u32, hint: Option<&CpuSet>) {
            match hint {
                Some(hint) => self.hints.insert(vector, hint.clone()),
                None => self.hints.remove(&vector),
            };
        }

        fn register_reassign_listener(&mut self, vector: u32) -> Result<(), Self::Error> {
            if self.refuse_listeners {
                return Err(std::io::Error::other("listener refused"));
            }
            self.listeners.insert(vector);
            Ok(())
        }

        fn unregister_reassign_listener(&mut self, vector: u32) -> Result<(), Self::Error> {
            self.listeners.remove(&vector);
            Ok(())
        }
    }

    /// Registry over a 2-node machine with 4 hyperthreaded cores per node
    fn registry() -> AffinityRegistry {
        let topology = TopologyBuilder::from_synthetic("node:2 core:4 pu:2")
            .unwrap()
            .build()
            .unwrap();
        AffinityRegistry::new(topology, [Some(0)])
    }

    fn attach(registry: &AffinityRegistry, receive_queue_count: usize) -> Device<RecordingHost> {
        registry
            .attach_device(
                RecordingHost::default(),
                DeviceConfig {
                    node_hint: Some(0),
                    receive_queue_count,
                },
            )
            .unwrap()
    }

    fn dma(vector: u32) -> IrqVector {
        IrqVector::new(vector, IrqSource::Dma { engine: vector })
    }

    #[test]
    fn category_names() {
        let names = IrqCategory::iter()
            .map(|category| category.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names.join(" "), "SDMA RCVCTXT GENERAL OTHER");
        assert_eq!(IrqSource::Receive { context: 3 }.category(), IrqCategory::Receive);
        assert_eq!(dma(1).category(), IrqCategory::Dma);
    }

    #[test]
    fn attach_is_idempotent() {
        let registry = registry();
        let device = attach(&registry, 2);
        assert_eq!(device.node(), 0);
        let entry = registry.node_entry(0).unwrap();
        assert_eq!(entry.general_cpu(), 0);
        assert_eq!(entry.receive_pool().mask(), &CpuSet::from(1));
        assert_eq!(entry.default_pool().mask(), &CpuSet::from_range(2..4));

        let _other = attach(&registry, 3);
        assert_eq!(registry.node_entry(0), Some(entry));
        assert_eq!(registry.node_entry(1), None);
    }

    #[test]
    fn placement_by_category() {
        let registry = registry();
        let mut device = attach(&registry, 3);
        let general = IrqVector::new(10, IrqSource::General);
        let control = IrqVector::new(11, IrqSource::Receive { context: CONTROL_CONTEXT });
        let receive = IrqVector::new(12, IrqSource::Receive { context: 1 });
        assert_eq!(registry.acquire_irq(&mut device, general), Ok(0));
        assert_eq!(registry.acquire_irq(&mut device, control), Ok(0));
        assert_eq!(registry.acquire_irq(&mut device, receive), Ok(1));
        assert_eq!(registry.acquire_irq(&mut device, dma(20)), Ok(3));
        assert_eq!(registry.acquire_irq(&mut device, dma(21)), Ok(3));
        assert_eq!(
            registry.acquire_irq(&mut device, IrqVector::new(30, IrqSource::Other)),
            Err(AffinityError::InvalidCategory {
                vector: 30,
                category: IrqCategory::Other
            })
        );

        let entry = registry.node_entry(0).unwrap();
        assert_eq!(entry.receive_pool().used(), &CpuSet::from(1));
        assert_eq!(entry.default_pool().generation(), 1);
        assert_eq!(device.host().hints.get(&12), Some(&CpuSet::from(1)));
        assert_eq!(device.host().listeners, BTreeSet::from([20, 21]));
        assert_eq!(device.target_cpu(20), Some(3));
        assert_eq!(device.armed_vectors().count(), 5);
    }

    #[test]
    fn release_mirrors_acquire() {
        let registry = registry();
        let mut device = attach(&registry, 2);
        let before = registry.node_entry(0).unwrap();
        let control = IrqVector::new(1, IrqSource::Receive { context: CONTROL_CONTEXT });
        let receive = IrqVector::new(2, IrqSource::Receive { context: 1 });
        for irq in [control, receive, dma(3)] {
            registry.acquire_irq(&mut device, irq).unwrap();
        }
        for vector in [1, 2, 3] {
            registry.release_irq(&mut device, vector).unwrap();
        }
        assert_eq!(registry.node_entry(0), Some(before));
        assert!(device.host().hints.is_empty());
        assert!(device.host().listeners.is_empty());
        assert_eq!(device.armed_vectors().count(), 0);

        // Releasing an unarmed vector is a no-op
        assert_eq!(registry.release_irq(&mut device, 42), Ok(()));
    }

    #[test]
    fn rearm_releases_first() {
        let registry = registry();
        let mut device = attach(&registry, 2);
        assert_eq!(registry.acquire_irq(&mut device, dma(7)), Ok(2));
        assert_eq!(registry.acquire_irq(&mut device, dma(7)), Ok(2));
        let entry = registry.node_entry(0).unwrap();
        assert_eq!(entry.default_pool().used(), &CpuSet::from(2));
        assert_eq!(entry.default_pool().generation(), 0);
    }

    #[test]
    fn errors() {
        let registry = registry();
        let mut device = attach(&registry, 1);
        let receive = IrqVector::new(5, IrqSource::Receive { context: 2 });
        assert_eq!(
            registry.acquire_irq(&mut device, receive),
            Err(AffinityError::AllocationFailure {
                node: 0,
                pool: PoolKind::Receive
            })
        );
        assert_eq!(device.target_cpu(5), None);

        let mut stray = Device {
            node: 1,
            host: RecordingHost::default(),
            vectors: BTreeMap::new(),
        };
        assert_eq!(
            registry.acquire_irq(&mut stray, dma(0)),
            Err(AffinityError::NoEntryForNode(1))
        );
    }

    #[test]
    fn listener_failure_is_not_fatal() {
        let registry = registry();
        let mut device = registry
            .attach_device(
                RecordingHost {
                    refuse_listeners: true,
                    ..Default::default()
                },
                DeviceConfig {
                    node_hint: Some(1),
                    receive_queue_count: 1,
                },
            )
            .unwrap();
        assert_eq!(registry.acquire_irq(&mut device, dma(0)), Ok(5));
        assert_eq!(device.host().hints.get(&0), Some(&CpuSet::from(5)));
        assert!(device.host().listeners.is_empty());
    }

    #[test]
    fn reassign_keeps_shared_cpu() {
        let registry = registry();
        // Default pool is {2, 3}
        let mut device = attach(&registry, 2);
        for vector in 0..3 {
            registry.acquire_irq(&mut device, dma(vector)).unwrap();
        }
        // Vectors 0 and 2 share CPU 2
        assert_eq!(device.target_cpu(2), Some(2));

        let notice = ReassignNotice { vector: 0, cpu: 6 };
        registry.on_external_reassign(&mut device, notice).unwrap();
        assert_eq!(device.target_cpu(0), Some(6));
        assert_eq!(device.host().hints.get(&0), Some(&CpuSet::from(6)));
        let pool = registry.node_entry(0).unwrap().default_pool().clone();
        assert_eq!(pool.mask().to_string(), "2-3,6");
        assert!(pool.used().is_set(6));

        // Now nothing else targets CPU 3
        let notice = ReassignNotice { vector: 1, cpu: 7 };
        registry.on_external_reassign(&mut device, notice).unwrap();
        let pool = registry.node_entry(0).unwrap().default_pool().clone();
        assert_eq!(pool.mask().to_string(), "2,6-7");
        assert!(pool.mask().includes(pool.used()));

        // Releasing a moved vector returns its new CPU
        registry.release_irq(&mut device, 1).unwrap();
        let pool = registry.node_entry(0).unwrap().default_pool().clone();
        assert!(!pool.used().is_set(7));
    }

    #[test]
    fn reassign_rejections() {
        let registry = registry();
        let mut device = attach(&registry, 2);
        let receive = IrqVector::new(1, IrqSource::Receive { context: 1 });
        registry.acquire_irq(&mut device, receive).unwrap();
        registry.acquire_irq(&mut device, dma(2)).unwrap();
        let before = registry.node_entry(0);

        let mut reassign = |vector, cpu| {
            registry.on_external_reassign(&mut device, ReassignNotice { vector, cpu })
        };
        assert_eq!(reassign(9, 3), Err(ReassignError::UnknownVector(9)));
        assert_eq!(
            reassign(1, 3),
            Err(ReassignError::NotDma {
                vector: 1,
                category: IrqCategory::Receive
            })
        );
        assert_eq!(
            reassign(2, 16),
            Err(ReassignError::OfflineCpu(ParameterError(16)))
        );
        assert_eq!(
            reassign(2, 2),
            Err(ReassignError::Unchanged { vector: 2, cpu: 2 })
        );
        assert_eq!(registry.node_entry(0), before);
        assert_eq!(device.target_cpu(2), Some(2));
    }
}
