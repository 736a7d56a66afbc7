use std::io::{BufRead, Write};

use parse_display::Display;
use thiserror::Error;
use tracing::debug;

use crate::constants::Word;

use super::{exception::Exception, to_address, Machine};

/// A raw fetched triplet, before decoding. The trace line always shows the
/// level and modifier fields as loaded, whatever the opcode makes of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ir {
    pub opcode: Word,
    pub level: Word,
    pub modifier: Word,
}

/// Outcome of decoding a triplet that is not a well-formed instruction.
///
/// An opcode outside 1..=9 is fatal. Unknown OPR and SYS modifiers are
/// diagnostics only: the machine prints the `Display` text below and moves
/// on without touching any state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(Word),

    #[error("Invalid M input")]
    UnknownOperation(Word),

    #[error("Invalid SYS M: {0}")]
    UnknownSysCall(Word),
}

/// An arithmetic or relational OPR sub-operation, selected by the
/// modifier field of opcode 2. Relational results are exactly 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "UPPERCASE")]
pub enum Operation {
    Rtn,
    Add,
    Sub,
    Mul,
    Div,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

/// A system call, selected by the modifier field of opcode 9
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysCall {
    /// Print the top of the stack, then pop it
    Print,

    /// Push one integer read from the input stream
    Read,

    /// Stop the machine
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Push a literal
    Lit(Word),

    /// Arithmetic/relational operation or return, on the top of the stack
    Opr(Operation),

    /// Push the value at `offset` below the base of the activation record
    /// `level` static links up
    Lod { level: Word, offset: Word },

    /// Store the popped top of the stack at `offset` below the base of the
    /// activation record `level` static links up
    Sto { level: Word, offset: Word },

    /// Call the procedure at `target`: write the activation record header
    /// (static link, dynamic link, return address) just below the stack
    /// pointer and rebase. The stack pointer itself only moves when the
    /// callee reserves its record with INC.
    Cal { level: Word, target: Word },

    /// Reserve cells for the current activation record
    Inc(Word),

    /// Unconditional jump to `target`
    Jmp(Word),

    /// Pop the top of the stack and jump to `target` if it was zero
    Jpc(Word),

    /// System call
    Sys(SysCall),
}

impl Operation {
    fn decode(modifier: Word) -> Result<Self, DecodeError> {
        let operation = match modifier {
            0 => Self::Rtn,
            1 => Self::Add,
            2 => Self::Sub,
            3 => Self::Mul,
            4 => Self::Div,
            5 => Self::Eql,
            6 => Self::Neq,
            7 => Self::Lss,
            8 => Self::Leq,
            9 => Self::Gtr,
            10 => Self::Geq,
            other => return Err(DecodeError::UnknownOperation(other)),
        };
        Ok(operation)
    }

    fn execute<R: BufRead, W: Write>(self, machine: &mut Machine<R, W>) -> Result<(), Exception> {
        match self {
            // Tear down the current activation record: drop the locals,
            // then restore the caller's base and resume address from the
            // dynamic link and return address cells of the header.
            Self::Rtn => {
                machine.registers.sp = to_address(machine.registers.bp as Word + 1)?;
                let sp = machine.registers.sp as Word;
                machine.registers.bp = to_address(machine.read_cell(sp - 2)?)?;
                machine.registers.pc = to_address(machine.read_cell(sp - 3)?)?;
                Ok(())
            }

            Self::Add => machine.binary_op(|lhs, rhs| Ok(lhs.wrapping_add(rhs))),
            Self::Sub => machine.binary_op(|lhs, rhs| Ok(lhs.wrapping_sub(rhs))),
            Self::Mul => machine.binary_op(|lhs, rhs| Ok(lhs.wrapping_mul(rhs))),
            Self::Div => machine.binary_op(|lhs, rhs| {
                if rhs == 0 {
                    Err(Exception::DivisionByZero)
                } else {
                    Ok(lhs.wrapping_div(rhs))
                }
            }),

            Self::Eql => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs == rhs))),
            Self::Neq => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs != rhs))),
            Self::Lss => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs < rhs))),
            Self::Leq => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs <= rhs))),
            Self::Gtr => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs > rhs))),
            Self::Geq => machine.binary_op(|lhs, rhs| Ok(Word::from(lhs >= rhs))),
        }
    }
}

impl SysCall {
    fn decode(modifier: Word) -> Result<Self, DecodeError> {
        match modifier {
            1 => Ok(Self::Print),
            2 => Ok(Self::Read),
            3 => Ok(Self::Halt),
            other => Err(DecodeError::UnknownSysCall(other)),
        }
    }
}

impl Instruction {
    /// Classify a fetched triplet.
    pub(crate) fn decode(ir: &Ir) -> Result<Self, DecodeError> {
        let instruction = match ir.opcode {
            1 => Self::Lit(ir.modifier),
            2 => Self::Opr(Operation::decode(ir.modifier)?),
            3 => Self::Lod {
                level: ir.level,
                offset: ir.modifier,
            },
            4 => Self::Sto {
                level: ir.level,
                offset: ir.modifier,
            },
            5 => Self::Cal {
                level: ir.level,
                target: ir.modifier,
            },
            6 => Self::Inc(ir.modifier),
            7 => Self::Jmp(ir.modifier),
            8 => Self::Jpc(ir.modifier),
            9 => Self::Sys(SysCall::decode(ir.modifier)?),
            opcode => return Err(DecodeError::InvalidOpcode(opcode)),
        };
        Ok(instruction)
    }

    /// Execute the instruction
    pub(crate) fn execute<R: BufRead, W: Write>(
        &self,
        machine: &mut Machine<R, W>,
    ) -> Result<(), Exception> {
        match self {
            Self::Lit(value) => machine.push(*value),

            Self::Opr(operation) => operation.execute(machine),

            Self::Lod { level, offset } => {
                let base = machine.base(*level)?;
                let value = machine.read_cell(base as Word - offset)?;
                machine.push(value)
            }

            Self::Sto { level, offset } => {
                let base = machine.base(*level)?;
                let address = to_address(base as Word - offset)?;
                let value = machine.pop()?;
                *machine.memory.get_mut(address)? = value;
                Ok(())
            }

            Self::Cal { level, target } => {
                let static_link = machine.base(*level)? as Word;
                let sp = machine.registers.sp as Word;

                machine.write_cell(sp - 1, static_link)?;
                machine.write_cell(sp - 2, machine.registers.bp as Word)?;
                machine.write_cell(sp - 3, machine.registers.pc as Word)?;

                machine.registers.bp = to_address(sp - 1)?;
                machine.jump(*target)
            }

            Self::Inc(cells) => {
                machine.registers.sp = to_address(machine.registers.sp as Word - cells)?;
                Ok(())
            }

            Self::Jmp(target) => machine.jump(*target),

            Self::Jpc(target) => {
                let value = machine.pop()?;
                if value == 0 {
                    machine.jump(*target)?;
                } else {
                    debug!(value, "branch not taken");
                }
                Ok(())
            }

            Self::Sys(SysCall::Print) => machine.sys_print(),
            Self::Sys(SysCall::Read) => machine.sys_read(),
            Self::Sys(SysCall::Halt) => {
                machine.halted = true;
                Ok(())
            }
        }
    }
}

// The trace column shows the bare mnemonic, with OPR rendered as its
// sub-operation mnemonic
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lit(_) => f.write_str("LIT"),
            Self::Opr(operation) => write!(f, "{operation}"),
            Self::Lod { .. } => f.write_str("LOD"),
            Self::Sto { .. } => f.write_str("STO"),
            Self::Cal { .. } => f.write_str("CAL"),
            Self::Inc(_) => f.write_str("INC"),
            Self::Jmp(_) => f.write_str("JMP"),
            Self::Jpc(_) => f.write_str("JPC"),
            Self::Sys(_) => f.write_str("SYS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode(opcode: Word, level: Word, modifier: Word) -> Result<Instruction, DecodeError> {
        Instruction::decode(&Ir {
            opcode,
            level,
            modifier,
        })
    }

    #[test]
    fn decode_test() {
        assert_eq!(decode(1, 0, 42), Ok(Instruction::Lit(42)));
        assert_eq!(decode(2, 0, 1), Ok(Instruction::Opr(Operation::Add)));
        assert_eq!(decode(3, 2, 4), Ok(Instruction::Lod { level: 2, offset: 4 }));
        assert_eq!(decode(5, 1, 9), Ok(Instruction::Cal { level: 1, target: 9 }));
        assert_eq!(decode(9, 0, 3), Ok(Instruction::Sys(SysCall::Halt)));
    }

    #[test]
    fn decode_invalid_opcode_test() {
        assert_eq!(decode(0, 0, 0), Err(DecodeError::InvalidOpcode(0)));
        assert_eq!(decode(10, 0, 0), Err(DecodeError::InvalidOpcode(10)));
        assert_eq!(decode(-1, 0, 0), Err(DecodeError::InvalidOpcode(-1)));
    }

    #[test]
    fn decode_unknown_modifier_test() {
        assert_eq!(decode(2, 0, 11), Err(DecodeError::UnknownOperation(11)));
        assert_eq!(decode(9, 0, 4), Err(DecodeError::UnknownSysCall(4)));
        assert_eq!(decode(9, 0, 0), Err(DecodeError::UnknownSysCall(0)));
    }

    #[test]
    fn mnemonic_test() {
        assert_eq!(decode(2, 0, 0).unwrap().to_string(), "RTN");
        assert_eq!(decode(2, 0, 4).unwrap().to_string(), "DIV");
        assert_eq!(decode(2, 0, 10).unwrap().to_string(), "GEQ");
        assert_eq!(decode(7, 0, 0).unwrap().to_string(), "JMP");
        assert_eq!(decode(9, 0, 1).unwrap().to_string(), "SYS");
    }

    #[test]
    fn diagnostic_text_test() {
        assert_eq!(DecodeError::UnknownOperation(11).to_string(), "Invalid M input");
        assert_eq!(DecodeError::UnknownSysCall(7).to_string(), "Invalid SYS M: 7");
    }
}
