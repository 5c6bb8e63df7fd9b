//! Opcodes of the raw instruction stream
//!
//! The stream is register based. Operand layouts are documented per opcode;
//! `reg` is a u16 register number, `idx` a u32 constant pool index and
//! `target` a u32 instruction index within the same code item.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Moves and returns
//! - 0x10-0x1F: Constants
//! - 0x20-0x2F: Objects and arrays
//! - 0x30-0x3F: Control flow and arithmetic
//! - 0x40-0x4F: Field access
//! - 0x50-0x5F: Invocation

/// Raw opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Moves & Returns (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Copy a register (operands: dst reg, src reg)
    Move = 0x01,
    /// Return from a void method
    ReturnVoid = 0x02,
    /// Return a value (operand: src reg)
    Return = 0x03,
    /// Store the result of the preceding invoke (operand: dst reg)
    MoveResult = 0x04,

    // ===== Constants (0x10-0x1F) =====
    /// 32-bit integer constant (operands: dst reg, i32)
    ConstInt = 0x10,
    /// 64-bit integer constant (operands: dst reg, i64)
    ConstWide = 0x11,
    /// 32-bit float constant (operands: dst reg, f32)
    ConstFloat = 0x12,
    /// 64-bit float constant (operands: dst reg, f64)
    ConstDouble = 0x13,
    /// String constant (operands: dst reg, string idx)
    ConstString = 0x14,
    /// Class literal (operands: dst reg, type idx)
    ConstClass = 0x15,
    /// Null reference (operand: dst reg)
    ConstNull = 0x16,

    // ===== Objects & Arrays (0x20-0x2F) =====
    /// Allocate an uninitialized instance (operands: dst reg, type idx)
    NewInstance = 0x20,
    /// Allocate an array (operands: dst reg, length reg, type idx)
    NewArray = 0x21,
    /// Array length (operands: dst reg, array reg)
    ArrayLength = 0x22,
    /// Checked cast (operands: dst reg, src reg, type idx)
    CheckCast = 0x23,
    /// Instance test (operands: dst reg, src reg, type idx)
    InstanceOf = 0x24,
    /// Throw an exception (operand: src reg)
    Throw = 0x25,

    // ===== Control Flow & Arithmetic (0x30-0x3F) =====
    /// Unconditional branch (operand: target)
    Goto = 0x30,
    /// Compare two registers (operands: cond u8, a reg, b reg, target)
    If = 0x31,
    /// Compare a register against zero (operands: cond u8, a reg, target)
    IfZero = 0x32,
    /// Binary arithmetic (operands: op u8, dst reg, a reg, b reg)
    Binary = 0x38,

    // ===== Field Access (0x40-0x4F) =====
    /// Instance field load (operands: dst reg, object reg, field idx)
    InstanceGet = 0x40,
    /// Instance field store (operands: src reg, object reg, field idx)
    InstancePut = 0x41,
    /// Static field load (operands: dst reg, field idx)
    StaticGet = 0x42,
    /// Static field store (operands: src reg, field idx)
    StaticPut = 0x43,

    // ===== Invocation (0x50-0x5F) =====
    /// Virtual dispatch (operands: method idx, argc u8, argc × reg)
    InvokeVirtual = 0x50,
    /// Superclass dispatch (same layout)
    InvokeSuper = 0x51,
    /// Non-virtual dispatch: constructors and private methods (same layout)
    InvokeDirect = 0x52,
    /// Static call (same layout)
    InvokeStatic = 0x53,
    /// Interface dispatch (same layout)
    InvokeInterface = 0x54,
}

impl Opcode {
    /// Convert a byte to an opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Move),
            0x02 => Some(Self::ReturnVoid),
            0x03 => Some(Self::Return),
            0x04 => Some(Self::MoveResult),
            0x10 => Some(Self::ConstInt),
            0x11 => Some(Self::ConstWide),
            0x12 => Some(Self::ConstFloat),
            0x13 => Some(Self::ConstDouble),
            0x14 => Some(Self::ConstString),
            0x15 => Some(Self::ConstClass),
            0x16 => Some(Self::ConstNull),
            0x20 => Some(Self::NewInstance),
            0x21 => Some(Self::NewArray),
            0x22 => Some(Self::ArrayLength),
            0x23 => Some(Self::CheckCast),
            0x24 => Some(Self::InstanceOf),
            0x25 => Some(Self::Throw),
            0x30 => Some(Self::Goto),
            0x31 => Some(Self::If),
            0x32 => Some(Self::IfZero),
            0x38 => Some(Self::Binary),
            0x40 => Some(Self::InstanceGet),
            0x41 => Some(Self::InstancePut),
            0x42 => Some(Self::StaticGet),
            0x43 => Some(Self::StaticPut),
            0x50 => Some(Self::InvokeVirtual),
            0x51 => Some(Self::InvokeSuper),
            0x52 => Some(Self::InvokeDirect),
            0x53 => Some(Self::InvokeStatic),
            0x54 => Some(Self::InvokeInterface),
            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic used by disassembly and error messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Move => "move",
            Self::ReturnVoid => "return-void",
            Self::Return => "return",
            Self::MoveResult => "move-result",
            Self::ConstInt => "const",
            Self::ConstWide => "const-wide",
            Self::ConstFloat => "const-float",
            Self::ConstDouble => "const-double",
            Self::ConstString => "const-string",
            Self::ConstClass => "const-class",
            Self::ConstNull => "const-null",
            Self::NewInstance => "new-instance",
            Self::NewArray => "new-array",
            Self::ArrayLength => "array-length",
            Self::CheckCast => "check-cast",
            Self::InstanceOf => "instance-of",
            Self::Throw => "throw",
            Self::Goto => "goto",
            Self::If => "if",
            Self::IfZero => "if-z",
            Self::Binary => "binop",
            Self::InstanceGet => "iget",
            Self::InstancePut => "iput",
            Self::StaticGet => "sget",
            Self::StaticPut => "sput",
            Self::InvokeVirtual => "invoke-virtual",
            Self::InvokeSuper => "invoke-super",
            Self::InvokeDirect => "invoke-direct",
            Self::InvokeStatic => "invoke-static",
            Self::InvokeInterface => "invoke-interface",
        }
    }

    /// Check if this opcode is a branch
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Goto | Self::If | Self::IfZero)
    }

    /// Check if this opcode is an invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual
                | Self::InvokeSuper
                | Self::InvokeDirect
                | Self::InvokeStatic
                | Self::InvokeInterface
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnVoid)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Self::Goto | Self::Throw)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
