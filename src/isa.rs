//! Instruction classification for call/return boundaries
//!
//! Only the opcode bits of the word at the instruction pointer are inspected.
//! Operands and instruction lengths are never decoded: the classifier only has
//! to tell the tracer that the *next* stop is a callee entry or a caller
//! resume point.

use std::ops::RangeInclusive;

/// Control-transfer class of a single instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Direct call: the next stop is the first instruction of the callee
    Call,
    /// Return: the next stop is the resumed instruction in the caller
    Return,
    /// Anything else
    Other,
}

/// Architecture-specific opcode matching
///
/// The call tree builder never looks at raw bytes or addresses itself; an
/// alternate instruction set only has to implement this trait.
pub trait InstructionSet {
    /// Classify the instruction whose first bytes are the low bytes of `word`
    fn classify(&self, word: u64) -> Instruction;

    /// Whether `resumed_at` is where execution continues after returning
    /// from a call instruction located at `call_site`
    fn is_return_site(&self, call_site: u64, resumed_at: u64) -> bool;
}

/// x86-64 call/return detection
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64;

/// `call rel32`
const CALL_REL32: u64 = 0xe8;

/// `ret imm16`, `ret`, `retf imm16`, `retf`
const RETURN_OPCODES: [u64; 4] = [0xc2, 0xc3, 0xca, 0xcb];

/// `repz ret` and `bnd ret`, as the low 16 bits of a little-endian word
const PREFIXED_RETURNS: [u64; 2] = [0xc3f3, 0xc3f2];

/// Offsets past a call site at which the caller may resume
const RETURN_WINDOW: RangeInclusive<u64> = 1..=8;

impl InstructionSet for X86_64 {
    fn classify(&self, word: u64) -> Instruction {
        let opcode = word & 0xff;
        let opcode2 = word & 0xffff;

        if opcode == CALL_REL32 {
            Instruction::Call
        } else if RETURN_OPCODES.contains(&opcode) || PREFIXED_RETURNS.contains(&opcode2) {
            Instruction::Return
        } else {
            Instruction::Other
        }
    }

    fn is_return_site(&self, call_site: u64, resumed_at: u64) -> bool {
        resumed_at
            .checked_sub(call_site)
            .is_some_and(|offset| RETURN_WINDOW.contains(&offset))
    }
}
