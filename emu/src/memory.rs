//! # Memory Region
//!
//! A flat, zero-initialised byte buffer owned by the running co-processor.
//! Words are little-endian, which matches every machine in the family that
//! has a 16-bit word.
//!
//! The region knows nothing about the Tube window or alignment rules: each
//! interpreter's bus decides which addresses reach the buffer.

#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Power-on state: every byte zero.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Addresses wrap at the region size.
    fn index(&self, address: usize) -> usize {
        address % self.data.len()
    }

    #[must_use]
    pub fn read_byte(&self, address: usize) -> u8 {
        self.data[self.index(address)]
    }

    pub fn write_byte(&mut self, address: usize, value: u8) {
        let index = self.index(address);
        self.data[index] = value;
    }

    #[must_use]
    pub fn read_word(&self, address: usize) -> u16 {
        u16::from_le_bytes([self.read_byte(address), self.read_byte(address + 1)])
    }

    pub fn write_word(&mut self, address: usize, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(address, low);
        self.write_byte(address + 1, high);
    }

    /// Copies `image` in at `offset`, truncating whatever does not fit.
    /// Returns the number of bytes copied.
    pub fn load(&mut self, offset: usize, image: &[u8]) -> usize {
        let Some(free) = self.data.len().checked_sub(offset) else {
            return 0;
        };
        let len = image.len().min(free);
        self.data[offset..offset + len].copy_from_slice(&image[..len]);
        len
    }

    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        let end = (offset + len).min(self.data.len());
        &self.data[offset.min(end)..end]
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory").field("len", &self.data.len()).finish()
    }
}
