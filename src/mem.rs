/// The size of the Z80 address space in bytes.
pub const ADDRESS_SPACE: usize = 0x10000;

/// Allows reading and writing to/from memory.
///
/// Addresses are 16 bits wide, so every address is in range. Multi-byte accesses wrap
/// around the top of the address space.
pub trait Memory {
    /// Stores a [`u8`] into memory at the given address.
    fn store_u8(&mut self, address: u16, value: u8);
    /// Stores a little-endian [`u16`] into memory at the given address.
    ///
    /// The default implementation calls upon [`Memory::store_u8`] twice.
    fn store_u16(&mut self, address: u16, value: u16) {
        self.store_u8(address, (value & 0xff) as u8);
        self.store_u8(address.wrapping_add(1), ((value >> 8) & 0xff) as u8);
    }

    /// Loads a [`u8`] from memory at the given address.
    fn load_u8(&self, address: u16) -> u8;
    /// Loads a little-endian [`u16`] from memory at the given address.
    ///
    /// The default implementation calls upon [`Memory::load_u8`] twice.
    fn load_u16(&self, address: u16) -> u16 {
        (self.load_u8(address) as u16) | ((self.load_u8(address.wrapping_add(1)) as u16) << 8)
    }

    /// Reads `length` consecutive bytes starting at `address`.
    fn read(&self, address: u16, length: usize) -> Vec<u8> {
        (0..length)
            .map(|offset| self.load_u8(address.wrapping_add(offset as u16)))
            .collect()
    }
}

/// A flat, zero-initialised 64 KiB RAM covering the whole address space.
///
/// See the [`Memory`] trait.
#[derive(Clone)]
pub struct FlatMemory {
    bytes: Box<[u8]>,
}
impl FlatMemory {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; ADDRESS_SPACE].into_boxed_slice(),
        }
    }
}
impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FlatMemory {{ {} bytes }}", self.bytes.len())
    }
}
impl Memory for FlatMemory {
    fn load_u8(&self, address: u16) -> u8 {
        self.bytes[address as usize]
    }
    fn store_u8(&mut self, address: u16, value: u8) {
        self.bytes[address as usize] = value;
    }
}
