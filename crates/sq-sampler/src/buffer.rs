//! Shader storage buffer table

use parking_lot::RwLock;
use sq_core::SamplerError;
use sq_exec::{shared_buffer, Buffer, SharedBuffer};
use tracing::debug;

pub const MAX_SHADER_BUFFERS: usize = 32;

#[derive(Debug)]
pub struct SoftBuffers {
    units: RwLock<Vec<Option<SharedBuffer>>>,
}

impl SoftBuffers {
    pub fn new() -> Self {
        Self {
            units: RwLock::new(vec![None; MAX_SHADER_BUFFERS]),
        }
    }

    pub fn bind(&self, unit: u32, buffer: Option<SharedBuffer>) -> Result<(), SamplerError> {
        let mut units = self.units.write();
        let slot = units
            .get_mut(unit as usize)
            .ok_or(SamplerError::UnitOutOfRange(unit))?;
        if let Some(buffer) = &buffer {
            debug!(unit, size = buffer.lock().len(), "bound shader buffer");
        }
        *slot = buffer;
        Ok(())
    }

    /// Bind a zero-filled buffer of `size` bytes and return it
    pub fn create(&self, unit: u32, size: usize) -> Result<SharedBuffer, SamplerError> {
        let buffer = shared_buffer(size);
        self.bind(unit, Some(buffer.clone()))?;
        Ok(buffer)
    }
}

impl Default for SoftBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer for SoftBuffers {
    fn lookup(&self, unit: u32) -> Option<SharedBuffer> {
        self.units.read().get(unit as usize).cloned().flatten()
    }
}
