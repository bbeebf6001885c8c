//! Bytecode instructions for the Ship VM
//!
//! Every instruction is a one-byte opcode followed by its operand: nothing, a
//! one-byte constant/slot index or count, or a big-endian two-byte jump offset.

use crate::error::ErrorKind;
use crate::value::Value;

/// Maximum number of constants per chunk; indices are encoded in one byte
pub const MAX_CONSTANTS: usize = 256;

/// Opcodes for the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Constants and literals
    Constant,       // Push constant (u8 index)
    True,
    False,
    Nil,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,

    // Boolean
    Not,
    Compare,        // ==
    LessThan,
    GreaterThan,

    // Stack hygiene
    PopTop,

    // Locals (u8 slot)
    StoreFast,      // Bind a freshly declared local
    LoadLocal,
    AssignLocal,    // Store into an existing local

    // Globals (u8 constant index of the name)
    LoadGlobal,
    AssignGlobal,

    // Control flow (u16 offset)
    PopJumpIfFalse,
    Jump,
    JumpBackward,

    // Functions
    Call,           // u8 argument count
    Return,

    // Iteration
    GetIter,
    ForIter,        // u16 offset past the loop when exhausted
    EndFor,

    // Aggregates and attributes
    BuildArray,     // u8 element count
    LoadAttr,       // u8 constant index of the attribute name

    // Output
    ShowTop,

    Halt,
}

impl OpCode {
    const ALL: [OpCode; 32] = [
        OpCode::Constant,
        OpCode::True,
        OpCode::False,
        OpCode::Nil,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Negate,
        OpCode::Not,
        OpCode::Compare,
        OpCode::LessThan,
        OpCode::GreaterThan,
        OpCode::PopTop,
        OpCode::StoreFast,
        OpCode::LoadLocal,
        OpCode::AssignLocal,
        OpCode::LoadGlobal,
        OpCode::AssignGlobal,
        OpCode::PopJumpIfFalse,
        OpCode::Jump,
        OpCode::JumpBackward,
        OpCode::Call,
        OpCode::Return,
        OpCode::GetIter,
        OpCode::ForIter,
        OpCode::EndFor,
        OpCode::BuildArray,
        OpCode::LoadAttr,
        OpCode::ShowTop,
        OpCode::Halt,
    ];

    /// Number of operand bytes following the opcode
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::StoreFast
            | OpCode::LoadLocal
            | OpCode::AssignLocal
            | OpCode::LoadGlobal
            | OpCode::AssignGlobal
            | OpCode::Call
            | OpCode::BuildArray
            | OpCode::LoadAttr => 1,
            OpCode::PopJumpIfFalse | OpCode::Jump | OpCode::JumpBackward | OpCode::ForIter => 2,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

/// A chunk of bytecode with associated data
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// The bytecode instructions
    pub code: Vec<u8>,

    /// Constant pool
    pub constants: Vec<Value>,

    /// Source line of every byte in `code`
    pub lines: Vec<usize>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode to the chunk
    pub fn write(&mut self, op: OpCode, line: usize) {
        self.write_byte(op.into(), line);
    }

    /// Write a raw byte (operand)
    pub fn write_byte(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write a 16-bit big-endian operand
    pub fn write_u16(&mut self, value: u16, line: usize) {
        let [hi, lo] = value.to_be_bytes();
        self.write_byte(hi, line);
        self.write_byte(lo, line);
    }

    /// Add a constant and return its one-byte index
    pub fn add_constant(&mut self, value: Value) -> Result<u8, ErrorKind> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(ErrorKind::TooManyConstants);
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u8)
    }

    /// Read a 16-bit value at offset
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Get current code length (for jump patching)
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Point the placeholder at `offset` to the current end of the chunk
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ErrorKind> {
        let jump = self.code.len() - offset - 2;
        let jump = u16::try_from(jump).map_err(|_| ErrorKind::JumpTooLarge)?;
        let [hi, lo] = jump.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
        Ok(())
    }

    /// Source line of the instruction at `offset`
    pub fn line_at(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or(0)
    }
}
