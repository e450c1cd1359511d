// crates/systems/spi_sram/src/memory.rs
use sram_core::{ImageError, MemoryImage};

/// The emulated chip's storage: `1 << addr_bits` bytes mapped at bus
/// address 0, so a shifted-in SPI address is already a DMA pointer.
pub struct MemoryArray {
    data: Vec<u8>,
    addr_bits: u8,
}

impl MemoryArray {
    /// Zero-filled array for the given address width.
    pub fn new(addr_bits: u8) -> Self {
        Self {
            data: vec![0; 1usize << addr_bits],
            addr_bits,
        }
    }

    /// Placeholder before setup sizes the array.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            addr_bits: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn addr_bits(&self) -> u8 {
        self.addr_bits
    }

    /// Out of range reads see an open bus (0).
    pub fn read(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0)
    }

    /// Out of range writes are dropped.
    pub fn write(&mut self, addr: u32, value: u8) {
        if let Some(byte) = self.data.get_mut(addr as usize) {
            *byte = value;
        }
    }

    /// Power-on pattern: `mem[n] = n mod 256`.
    pub fn fill_pattern(&mut self) {
        for (n, byte) in self.data.iter_mut().enumerate() {
            *byte = n as u8;
        }
    }

    /// Copies an image to the bottom of the array; the rest is left alone.
    pub fn load_image(&mut self, image: &MemoryImage) -> Result<(), ImageError> {
        image.check_fits(self.data.len())?;
        self.data[..image.data.len()].copy_from_slice(&image.data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// `len` bytes from `addr`, clamped to the end of the array.
    pub fn slice(&self, addr: u32, len: usize) -> &[u8] {
        let start = (addr as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }
}
