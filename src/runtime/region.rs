//! Region codec
//!
//! Guests describe every buffer they exchange with the host as a *region*: a
//! 12-byte little-endian header `[offset, capacity, length]` that points at
//! the actual bytes in linear memory. The guest owns allocation through its
//! exported `allocate(len) -> region_ptr` and, optionally,
//! `deallocate(region_ptr)`.
//!
//! Calling `allocate` may grow linear memory, so [`Guest`] looks up the
//! memory export again for every operation and never keeps a view of the
//! bytes across a guest call.

use serde::Serialize;
use tracing::warn;
use wasmtime::{Instance, Memory, StoreContextMut};

use crate::error::MocknetError;

/// Size of a region header in guest memory.
pub const REGION_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u32,
    pub capacity: u32,
    pub length: u32,
}

impl Region {
    pub fn from_bytes(bytes: [u8; REGION_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            offset: word(0),
            capacity: word(4),
            length: word(8),
        }
    }

    pub fn to_bytes(self) -> [u8; REGION_SIZE] {
        let mut bytes = [0u8; REGION_SIZE];
        bytes[0..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}

/// Region-level access to one guest instance.
///
/// Works both from the outside (over a `Store`) and from inside a host
/// function (over a `Caller`), since both hand out a `StoreContextMut`.
pub struct Guest<'a, T: 'static> {
    ctx: StoreContextMut<'a, T>,
    instance: Instance,
}

impl<'a, T: 'static> Guest<'a, T> {
    pub fn new(ctx: StoreContextMut<'a, T>, instance: Instance) -> Self {
        Self { ctx, instance }
    }

    pub fn data(&self) -> &T {
        self.ctx.data()
    }

    pub fn data_mut(&mut self) -> &mut T {
        self.ctx.data_mut()
    }

    fn memory(&mut self) -> Result<Memory, MocknetError> {
        self.instance
            .get_memory(&mut self.ctx, "memory")
            .ok_or_else(|| MocknetError::MissingExport("memory".into()))
    }

    pub fn read_region(&mut self, ptr: u32) -> Result<Region, MocknetError> {
        let memory = self.memory()?;
        let mut header = [0u8; REGION_SIZE];
        memory
            .read(&self.ctx, ptr as usize, &mut header)
            .map_err(|e| MocknetError::InvalidRegion {
                ptr,
                reason: e.to_string(),
            })?;

        let region = Region::from_bytes(header);
        if region.length > region.capacity {
            return Err(MocknetError::InvalidRegion {
                ptr,
                reason: format!(
                    "length {} exceeds capacity {}",
                    region.length, region.capacity
                ),
            });
        }
        Ok(region)
    }

    fn write_region(&mut self, ptr: u32, region: Region) -> Result<(), MocknetError> {
        let memory = self.memory()?;
        memory
            .write(&mut self.ctx, ptr as usize, &region.to_bytes())
            .map_err(|e| MocknetError::InvalidRegion {
                ptr,
                reason: e.to_string(),
            })
    }

    /// Copy out the bytes of the region at `ptr`, leaving the region allocated.
    ///
    /// Used for arguments of host functions, which stay owned by the guest.
    pub fn peek_buffer(&mut self, ptr: u32) -> Result<Vec<u8>, MocknetError> {
        let region = self.read_region(ptr)?;
        let memory = self.memory()?;
        let mut data = vec![0u8; region.length as usize];
        memory
            .read(&self.ctx, region.offset as usize, &mut data)
            .map_err(|e| MocknetError::InvalidRegion {
                ptr,
                reason: format!("data out of bounds: {e}"),
            })?;
        Ok(data)
    }

    pub fn peek_utf8(&mut self, ptr: u32) -> Result<String, MocknetError> {
        let bytes = self.peek_buffer(ptr)?;
        String::from_utf8(bytes).map_err(|e| {
            MocknetError::Protocol(format!("region at {ptr:#x} is not valid UTF-8: {e}"))
        })
    }

    /// Copy out the bytes of the region at `ptr` and hand the region back to
    /// the guest's deallocator.
    pub fn read_buffer(&mut self, ptr: u32) -> Result<Vec<u8>, MocknetError> {
        let data = self.peek_buffer(ptr)?;
        self.deallocate(ptr);
        Ok(data)
    }

    pub fn read_utf8(&mut self, ptr: u32) -> Result<String, MocknetError> {
        let text = self.peek_utf8(ptr)?;
        self.deallocate(ptr);
        Ok(text)
    }

    /// Write `bytes` into the existing region at `ptr` and set its length.
    ///
    /// Fails with [`MocknetError::RegionOverflow`] without touching memory
    /// when the region is too small.
    pub fn write_buffer(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), MocknetError> {
        let mut region = self.read_region(ptr)?;
        if bytes.len() > region.capacity as usize {
            return Err(MocknetError::RegionOverflow {
                needed: bytes.len(),
                capacity: region.capacity,
            });
        }

        let memory = self.memory()?;
        memory
            .write(&mut self.ctx, region.offset as usize, bytes)
            .map_err(|e| MocknetError::InvalidRegion {
                ptr,
                reason: format!("data out of bounds: {e}"),
            })?;

        region.length = bytes.len() as u32;
        self.write_region(ptr, region)
    }

    /// Ask the guest for a fresh region and fill it with `bytes`.
    pub fn pass_buffer(&mut self, bytes: &[u8]) -> Result<u32, MocknetError> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            MocknetError::Protocol(format!("{} bytes do not fit a guest region", bytes.len()))
        })?;
        let allocate = self
            .instance
            .get_typed_func::<u32, u32>(&mut self.ctx, "allocate")
            .map_err(|_| MocknetError::MissingExport("allocate".into()))?;
        let ptr = allocate
            .call(&mut self.ctx, len)
            .map_err(|e| MocknetError::Trap(format!("allocate({len}) failed: {}", e.root_cause())))?;

        self.write_buffer(ptr, bytes)?;
        Ok(ptr)
    }

    pub fn pass_utf8(&mut self, text: &str) -> Result<u32, MocknetError> {
        self.pass_buffer(text.as_bytes())
    }

    pub fn pass<V: Serialize + ?Sized>(&mut self, value: &V) -> Result<u32, MocknetError> {
        let bytes = serde_json::to_vec(value)?;
        self.pass_buffer(&bytes)
    }

    /// Best effort: guests without a `deallocate` export simply leak.
    pub fn deallocate(&mut self, ptr: u32) {
        let Ok(deallocate) = self
            .instance
            .get_typed_func::<u32, ()>(&mut self.ctx, "deallocate")
        else {
            return;
        };
        if let Err(err) = deallocate.call(&mut self.ctx, ptr) {
            warn!(ptr, error = %err.root_cause(), "guest deallocate failed");
        }
    }
}
