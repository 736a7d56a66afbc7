/// Index into the process address space
pub type Address = usize;

/// Content of a memory cell: an instruction field or a stack value
pub type Word = i64;

/// Total size of the process address space, code and stack included
pub const MEMORY_SIZE: Address = 500;
