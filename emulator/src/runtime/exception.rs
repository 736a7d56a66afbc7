use thiserror::Error;

use crate::constants::Word;

use super::memory::MemoryError;

/// Fatal machine faults. Each one stops the fetch-execute loop; the
/// diagnostic the machine prints for it is `Error: ` followed by the
/// `Display` rendering below.
#[derive(Debug, Error)]
pub enum Exception {
    /// The fetched opcode is not one of the nine defined operations
    #[error("invalid opcode {0}")]
    InvalidOpcode(Word),

    /// OPR 4 with a zero divisor
    #[error("division by zero")]
    DivisionByZero,

    /// A word used as an address (static link, return address, jump
    /// target, stack offset) does not name a cell
    #[error("invalid address {0}")]
    InvalidAddress(Word),

    /// A register walked outside the address space
    #[error("invalid memory access ({0})")]
    InvalidMemoryAccess(#[from] MemoryError),

    /// The trace sink or the input stream failed
    #[error("i/o failure ({0})")]
    Io(#[from] std::io::Error),
}
