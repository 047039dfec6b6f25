//! Shared Resource Module
//!
//! GPU-addressable memory shared between the command stream and the host.
//! Contents are qwords accessed atomically: the command stream stores with
//! release ordering, the host loads with acquire ordering, so a marker the
//! host observes is never torn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identifier of a resource in a [`ResourceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u32);

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Page-locked memory object with a fixed GPU address.
pub struct SharedResource {
    name: String,
    gpu_address: u64,
    qwords: Box<[AtomicU64]>,
}

impl SharedResource {
    /// Creates a zeroed resource of `size` bytes, rounded up to a qword.
    pub fn new(name: impl Into<String>, gpu_address: u64, size: usize) -> Self {
        let count = size.div_ceil(8);
        Self {
            name: name.into(),
            gpu_address,
            qwords: (0..count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    pub fn size(&self) -> usize {
        self.qwords.len() * 8
    }

    /// Whether `[address, address + len)` lies inside this resource.
    pub fn contains(&self, address: u64, len: usize) -> bool {
        address >= self.gpu_address
            && address
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.gpu_address + self.size() as u64)
    }

    fn slot(&self, offset: usize) -> Result<&AtomicU64> {
        if offset % 8 != 0 {
            return Err(Error::Decode {
                offset,
                reason: format!("unaligned qword access to {}", self.name),
            });
        }
        self.qwords.get(offset / 8).ok_or_else(|| Error::Decode {
            offset,
            reason: format!("access past the end of {} ({} bytes)", self.name, self.size()),
        })
    }

    /// Host-side read.
    pub fn load(&self, offset: usize) -> Result<u64> {
        Ok(self.slot(offset)?.load(Ordering::Acquire))
    }

    /// Write of one qword, as performed by a post-sync operation or by the
    /// host when it resets a marker.
    pub fn store(&self, offset: usize, value: u64) -> Result<()> {
        self.slot(offset)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Write addressed by GPU address instead of offset.
    pub fn store_at(&self, gpu_address: u64, value: u64) -> Result<()> {
        let offset = gpu_address.wrapping_sub(self.gpu_address) as usize;
        self.store(offset, value)
    }

    pub fn fill(&self, value: u64) {
        for q in self.qwords.iter() {
            q.store(value, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResource")
            .field("name", &self.name)
            .field("gpu_address", &format_args!("{:#x}", self.gpu_address))
            .field("size", &self.size())
            .finish()
    }
}

/// GPU virtual address space handed out to new resources.
pub const RESOURCE_ADDRESS_BASE: u64 = 0x1_0000_0000;
const RESOURCE_ADDRESS_ALIGNMENT: u64 = 0x1000;

/// All resources known to a device, by handle and by GPU address.
pub struct ResourceTable {
    resources: HashMap<ResourceHandle, Arc<SharedResource>>,
    next_resource_id: u32,
    next_address: u64,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            next_resource_id: 1,
            next_address: RESOURCE_ADDRESS_BASE,
        }
    }

    /// Allocates a zeroed resource and returns its handle.
    pub fn create(&mut self, name: &str, size: usize) -> (ResourceHandle, Arc<SharedResource>) {
        let handle = ResourceHandle(self.next_resource_id);
        self.next_resource_id += 1;

        let address = self.next_address;
        let span = (size.max(1) as u64).next_multiple_of(RESOURCE_ADDRESS_ALIGNMENT);
        self.next_address += span;

        let resource = Arc::new(SharedResource::new(name, address, size));
        self.resources.insert(handle, resource.clone());
        debug!(
            "Created resource {} '{}': {} bytes at {:#x}",
            handle, name, size, address
        );
        (handle, resource)
    }

    pub fn destroy(&mut self, handle: ResourceHandle) -> bool {
        if self.resources.remove(&handle).is_some() {
            debug!("Destroyed resource {}", handle);
            true
        } else {
            warn!("Attempted to destroy non-existent resource {}", handle);
            false
        }
    }

    pub fn get(&self, handle: ResourceHandle) -> Result<&Arc<SharedResource>> {
        self.resources
            .get(&handle)
            .ok_or(Error::UnknownResource(handle.0))
    }

    /// Resource covering `[address, address + len)`.
    pub fn find_by_address(&self, address: u64, len: usize) -> Option<&Arc<SharedResource>> {
        self.resources.values().find(|r| r.contains(address, len))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
