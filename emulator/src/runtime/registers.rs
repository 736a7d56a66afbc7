use crate::constants::Address;

/// The register file. Every register holds an address into memory, not a
/// value; the decoded instruction register lives only for the duration of
/// one cycle and is not stored here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Program counter: address of the next opcode cell to fetch
    pub pc: Address,

    /// Base pointer: address of the current activation record
    pub bp: Address,

    /// Stack pointer: address of the top of the stack; cells below it are
    /// free, the stack grows toward address 0
    pub sp: Address,
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "%pc = {} | %bp = {} | %sp = {}",
            self.pc, self.bp, self.sp
        )
    }
}
