use thiserror::Error;

use crate::constants::{Address, Word, MEMORY_SIZE};

/// Represents errors related to memory manipulations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The given address was outside the process address space
    #[error("invalid address {0}")]
    InvalidAddress(Address),
}

/// The process address space: one fixed array of words shared by the code
/// region (loaded at the top, growing down) and the stack (growing toward
/// address 0). Cells are untyped; whether a cell is an instruction field or
/// a stack value depends only on which region is being addressed.
pub struct Memory {
    inner: Box<[Word; MEMORY_SIZE]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            inner: Box::new([0; MEMORY_SIZE]),
        }
    }
}

impl Memory {
    /// Build a memory image with the given triplets laid out downward from
    /// the top address, three cells per instruction (opcode highest), and
    /// every other cell zeroed. Also returns the address of the first free
    /// cell below the code, which becomes the initial stack pointer.
    ///
    /// Triplets that would not fit below address 0 are ignored.
    pub(crate) fn with_code(code: &[[Word; 3]]) -> (Self, Address) {
        let mut memory = Self::default();
        let count = code.len().min(MEMORY_SIZE / 3);

        for (index, [opcode, level, modifier]) in code.iter().take(count).enumerate() {
            let top = MEMORY_SIZE - 1 - 3 * index;
            memory.inner[top] = *opcode;
            memory.inner[top - 1] = *level;
            memory.inner[top - 2] = *modifier;
        }

        (memory, MEMORY_SIZE - 3 * count)
    }

    /// Get the cell at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get(&self, address: Address) -> Result<&Word, MemoryError> {
        self.inner
            .get(address)
            .ok_or(MemoryError::InvalidAddress(address))
    }

    /// Get a mutable reference to the cell at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get_mut(&mut self, address: Address) -> Result<&mut Word, MemoryError> {
        self.inner
            .get_mut(address)
            .ok_or(MemoryError::InvalidAddress(address))
    }
}
