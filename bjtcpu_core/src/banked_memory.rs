pub mod banked_memory {
    use crate::error::error::LoadError;

    pub const BANK_SIZE: usize = 0x100;
    pub const BANK_COUNT: usize = 0x100;
    pub const STORE_SIZE: usize = BANK_SIZE * BANK_COUNT;

    /// A 64KB store split into 256 banks of 256 bytes. Every (bank, offset)
    /// pair is in range, so reads and writes never fail; only bulk loads
    /// are bounds-checked.
    #[derive(Clone)]
    pub struct BankedMemory {
        cells: Vec<u8>,
    }

    impl Default for BankedMemory {
        fn default() -> BankedMemory {
            BankedMemory::new()
        }
    }

    impl BankedMemory {
        pub fn new() -> BankedMemory {
            BankedMemory { cells: vec![0; STORE_SIZE] }
        }

        fn index(bank: u8, offset: u8) -> usize {
            bank as usize * BANK_SIZE + offset as usize
        }

        pub fn read(&self, bank: u8, offset: u8) -> u8 {
            self.cells[Self::index(bank, offset)]
        }

        pub fn write(&mut self, bank: u8, offset: u8, value: u8) {
            self.cells[Self::index(bank, offset)] = value;
        }

        /// Read through a flat 16-bit address: high byte is the bank.
        pub fn read_linear(&self, addr: u16) -> u8 {
            let [bank, offset] = addr.to_be_bytes();
            self.read(bank, offset)
        }

        pub fn clear(&mut self) {
            self.cells.fill(0);
        }

        /// Replace the whole store with `data` followed by zeroes.
        pub fn load(&mut self, data: &[u8]) -> Result<(), LoadError> {
            if data.len() > STORE_SIZE {
                return Err(LoadError::TooLarge { len: data.len(), capacity: STORE_SIZE });
            }

            self.cells.fill(0);
            self.cells[..data.len()].copy_from_slice(data);
            Ok(())
        }

        pub fn bank(&self, bank: u8) -> &[u8] {
            let start = Self::index(bank, 0);
            &self.cells[start..start + BANK_SIZE]
        }

        pub fn as_slice(&self) -> &[u8] {
            &self.cells
        }
    }
}
