//! Raw instructions
//!
//! [`Insn`] is the decoded form of one entry of a code item's instruction
//! stream. Operands are register numbers and constant pool indices; nothing
//! here resolves them.

use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use crate::opcode::Opcode;

/// Comparison used by conditional branches
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `a == b`
    Eq = 0,
    /// `a != b`
    Ne = 1,
    /// `a < b`
    Lt = 2,
    /// `a >= b`
    Ge = 3,
    /// `a > b`
    Gt = 4,
    /// `a <= b`
    Le = 5,
}

impl Condition {
    /// Decode a condition tag
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Lt),
            3 => Some(Self::Ge),
            4 => Some(Self::Gt),
            5 => Some(Self::Le),
            _ => None,
        }
    }

    /// Mnemonic suffix (`eq`, `ne`, ...)
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Gt => "gt",
            Self::Le => "le",
        }
    }
}

/// Binary arithmetic operator
#[allow(missing_docs)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Rem = 4,
    And = 5,
    Or = 6,
    Xor = 7,
    Shl = 8,
    Shr = 9,
    Ushr = 10,
}

impl BinaryOp {
    /// Decode an operator tag
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Add),
            1 => Some(Self::Sub),
            2 => Some(Self::Mul),
            3 => Some(Self::Div),
            4 => Some(Self::Rem),
            5 => Some(Self::And),
            6 => Some(Self::Or),
            7 => Some(Self::Xor),
            8 => Some(Self::Shl),
            9 => Some(Self::Shr),
            10 => Some(Self::Ushr),
            _ => None,
        }
    }

    /// Mnemonic (`add`, `sub`, ...)
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Ushr => "ushr",
        }
    }
}

/// Dispatch flavor of an invoke instruction
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeType {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeType {
    /// The opcode encoding this dispatch flavor
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Virtual => Opcode::InvokeVirtual,
            Self::Super => Opcode::InvokeSuper,
            Self::Direct => Opcode::InvokeDirect,
            Self::Static => Opcode::InvokeStatic,
            Self::Interface => Opcode::InvokeInterface,
        }
    }

    fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::InvokeVirtual => Some(Self::Virtual),
            Opcode::InvokeSuper => Some(Self::Super),
            Opcode::InvokeDirect => Some(Self::Direct),
            Opcode::InvokeStatic => Some(Self::Static),
            Opcode::InvokeInterface => Some(Self::Interface),
            _ => None,
        }
    }
}

/// Constant pool entry referenced by an instruction
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRef {
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
}

/// One raw instruction
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Insn {
    Nop,
    Move { dst: u16, src: u16 },
    ReturnVoid,
    Return { src: u16 },
    MoveResult { dst: u16 },
    ConstInt { dst: u16, value: i32 },
    ConstWide { dst: u16, value: i64 },
    ConstFloat { dst: u16, value: f32 },
    ConstDouble { dst: u16, value: f64 },
    ConstString { dst: u16, string: u32 },
    ConstClass { dst: u16, ty: u32 },
    ConstNull { dst: u16 },
    NewInstance { dst: u16, ty: u32 },
    NewArray { dst: u16, length: u16, ty: u32 },
    ArrayLength { dst: u16, array: u16 },
    CheckCast { dst: u16, src: u16, ty: u32 },
    InstanceOf { dst: u16, src: u16, ty: u32 },
    Throw { src: u16 },
    Goto { target: u32 },
    If { cond: Condition, a: u16, b: u16, target: u32 },
    IfZero { cond: Condition, a: u16, target: u32 },
    Binary { op: BinaryOp, dst: u16, a: u16, b: u16 },
    InstanceGet { dst: u16, object: u16, field: u32 },
    InstancePut { src: u16, object: u16, field: u32 },
    StaticGet { dst: u16, field: u32 },
    StaticPut { src: u16, field: u32 },
    Invoke { kind: InvokeType, method: u32, args: Vec<u16> },
}

impl Insn {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Insn::Nop => Opcode::Nop,
            Insn::Move { .. } => Opcode::Move,
            Insn::ReturnVoid => Opcode::ReturnVoid,
            Insn::Return { .. } => Opcode::Return,
            Insn::MoveResult { .. } => Opcode::MoveResult,
            Insn::ConstInt { .. } => Opcode::ConstInt,
            Insn::ConstWide { .. } => Opcode::ConstWide,
            Insn::ConstFloat { .. } => Opcode::ConstFloat,
            Insn::ConstDouble { .. } => Opcode::ConstDouble,
            Insn::ConstString { .. } => Opcode::ConstString,
            Insn::ConstClass { .. } => Opcode::ConstClass,
            Insn::ConstNull { .. } => Opcode::ConstNull,
            Insn::NewInstance { .. } => Opcode::NewInstance,
            Insn::NewArray { .. } => Opcode::NewArray,
            Insn::ArrayLength { .. } => Opcode::ArrayLength,
            Insn::CheckCast { .. } => Opcode::CheckCast,
            Insn::InstanceOf { .. } => Opcode::InstanceOf,
            Insn::Throw { .. } => Opcode::Throw,
            Insn::Goto { .. } => Opcode::Goto,
            Insn::If { .. } => Opcode::If,
            Insn::IfZero { .. } => Opcode::IfZero,
            Insn::Binary { .. } => Opcode::Binary,
            Insn::InstanceGet { .. } => Opcode::InstanceGet,
            Insn::InstancePut { .. } => Opcode::InstancePut,
            Insn::StaticGet { .. } => Opcode::StaticGet,
            Insn::StaticPut { .. } => Opcode::StaticPut,
            Insn::Invoke { kind, .. } => kind.opcode(),
        }
    }

    /// Every register operand, in operand order
    pub fn registers(&self) -> Vec<u16> {
        match self {
            Insn::Nop | Insn::ReturnVoid | Insn::Goto { .. } => Vec::new(),
            Insn::Move { dst, src } => vec![*dst, *src],
            Insn::Return { src } | Insn::Throw { src } => vec![*src],
            Insn::MoveResult { dst }
            | Insn::ConstInt { dst, .. }
            | Insn::ConstWide { dst, .. }
            | Insn::ConstFloat { dst, .. }
            | Insn::ConstDouble { dst, .. }
            | Insn::ConstString { dst, .. }
            | Insn::ConstClass { dst, .. }
            | Insn::ConstNull { dst }
            | Insn::NewInstance { dst, .. }
            | Insn::StaticGet { dst, .. } => vec![*dst],
            Insn::NewArray { dst, length, .. } => vec![*dst, *length],
            Insn::ArrayLength { dst, array } => vec![*dst, *array],
            Insn::CheckCast { dst, src, .. } | Insn::InstanceOf { dst, src, .. } => {
                vec![*dst, *src]
            }
            Insn::If { a, b, .. } => vec![*a, *b],
            Insn::IfZero { a, .. } => vec![*a],
            Insn::Binary { dst, a, b, .. } => vec![*dst, *a, *b],
            Insn::InstanceGet { dst, object, .. } => vec![*dst, *object],
            Insn::InstancePut { src, object, .. } => vec![*src, *object],
            Insn::StaticPut { src, .. } => vec![*src],
            Insn::Invoke { args, .. } => args.clone(),
        }
    }

    /// Branch target, if this is a branch
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Insn::Goto { target } | Insn::If { target, .. } | Insn::IfZero { target, .. } => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Constant pool entry referenced by this instruction, if any
    pub fn pool_ref(&self) -> Option<PoolRef> {
        match self {
            Insn::ConstString { string, .. } => Some(PoolRef::String(*string)),
            Insn::ConstClass { ty, .. }
            | Insn::NewInstance { ty, .. }
            | Insn::NewArray { ty, .. }
            | Insn::CheckCast { ty, .. }
            | Insn::InstanceOf { ty, .. } => Some(PoolRef::Type(*ty)),
            Insn::InstanceGet { field, .. }
            | Insn::InstancePut { field, .. }
            | Insn::StaticGet { field, .. }
            | Insn::StaticPut { field, .. } => Some(PoolRef::Field(*field)),
            Insn::Invoke { method, .. } => Some(PoolRef::Method(*method)),
            _ => None,
        }
    }

    /// Encode this instruction
    pub fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_opcode(self.opcode());
        match self {
            Insn::Nop | Insn::ReturnVoid => {}
            Insn::Move { dst, src } => {
                writer.emit_u16(*dst);
                writer.emit_u16(*src);
            }
            Insn::Return { src } | Insn::Throw { src } => writer.emit_u16(*src),
            Insn::MoveResult { dst } | Insn::ConstNull { dst } => writer.emit_u16(*dst),
            Insn::ConstInt { dst, value } => {
                writer.emit_u16(*dst);
                writer.emit_i32(*value);
            }
            Insn::ConstWide { dst, value } => {
                writer.emit_u16(*dst);
                writer.emit_i64(*value);
            }
            Insn::ConstFloat { dst, value } => {
                writer.emit_u16(*dst);
                writer.emit_f32(*value);
            }
            Insn::ConstDouble { dst, value } => {
                writer.emit_u16(*dst);
                writer.emit_f64(*value);
            }
            Insn::ConstString { dst, string: index }
            | Insn::ConstClass { dst, ty: index }
            | Insn::NewInstance { dst, ty: index }
            | Insn::StaticGet { dst, field: index } => {
                writer.emit_u16(*dst);
                writer.emit_u32(*index);
            }
            Insn::StaticPut { src, field } => {
                writer.emit_u16(*src);
                writer.emit_u32(*field);
            }
            Insn::NewArray { dst, length: src, ty }
            | Insn::CheckCast { dst, src, ty }
            | Insn::InstanceOf { dst, src, ty } => {
                writer.emit_u16(*dst);
                writer.emit_u16(*src);
                writer.emit_u32(*ty);
            }
            Insn::ArrayLength { dst, array } => {
                writer.emit_u16(*dst);
                writer.emit_u16(*array);
            }
            Insn::Goto { target } => writer.emit_u32(*target),
            Insn::If { cond, a, b, target } => {
                writer.emit_u8(*cond as u8);
                writer.emit_u16(*a);
                writer.emit_u16(*b);
                writer.emit_u32(*target);
            }
            Insn::IfZero { cond, a, target } => {
                writer.emit_u8(*cond as u8);
                writer.emit_u16(*a);
                writer.emit_u32(*target);
            }
            Insn::Binary { op, dst, a, b } => {
                writer.emit_u8(*op as u8);
                writer.emit_u16(*dst);
                writer.emit_u16(*a);
                writer.emit_u16(*b);
            }
            Insn::InstanceGet { dst: value, object, field }
            | Insn::InstancePut { src: value, object, field } => {
                writer.emit_u16(*value);
                writer.emit_u16(*object);
                writer.emit_u32(*field);
            }
            Insn::Invoke { method, args, .. } => {
                writer.emit_u32(*method);
                writer.emit_u8(args.len() as u8);
                for arg in args {
                    writer.emit_u16(*arg);
                }
            }
        }
    }

    /// Decode one instruction
    pub fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let opcode = reader.read_opcode()?;
        let insn = match opcode {
            Opcode::Nop => Insn::Nop,
            Opcode::Move => Insn::Move {
                dst: reader.read_u16()?,
                src: reader.read_u16()?,
            },
            Opcode::ReturnVoid => Insn::ReturnVoid,
            Opcode::Return => Insn::Return {
                src: reader.read_u16()?,
            },
            Opcode::MoveResult => Insn::MoveResult {
                dst: reader.read_u16()?,
            },
            Opcode::ConstInt => Insn::ConstInt {
                dst: reader.read_u16()?,
                value: reader.read_i32()?,
            },
            Opcode::ConstWide => Insn::ConstWide {
                dst: reader.read_u16()?,
                value: reader.read_i64()?,
            },
            Opcode::ConstFloat => Insn::ConstFloat {
                dst: reader.read_u16()?,
                value: reader.read_f32()?,
            },
            Opcode::ConstDouble => Insn::ConstDouble {
                dst: reader.read_u16()?,
                value: reader.read_f64()?,
            },
            Opcode::ConstString => Insn::ConstString {
                dst: reader.read_u16()?,
                string: reader.read_u32()?,
            },
            Opcode::ConstClass => Insn::ConstClass {
                dst: reader.read_u16()?,
                ty: reader.read_u32()?,
            },
            Opcode::ConstNull => Insn::ConstNull {
                dst: reader.read_u16()?,
            },
            Opcode::NewInstance => Insn::NewInstance {
                dst: reader.read_u16()?,
                ty: reader.read_u32()?,
            },
            Opcode::NewArray => Insn::NewArray {
                dst: reader.read_u16()?,
                length: reader.read_u16()?,
                ty: reader.read_u32()?,
            },
            Opcode::ArrayLength => Insn::ArrayLength {
                dst: reader.read_u16()?,
                array: reader.read_u16()?,
            },
            Opcode::CheckCast => Insn::CheckCast {
                dst: reader.read_u16()?,
                src: reader.read_u16()?,
                ty: reader.read_u32()?,
            },
            Opcode::InstanceOf => Insn::InstanceOf {
                dst: reader.read_u16()?,
                src: reader.read_u16()?,
                ty: reader.read_u32()?,
            },
            Opcode::Throw => Insn::Throw {
                src: reader.read_u16()?,
            },
            Opcode::Goto => Insn::Goto {
                target: reader.read_u32()?,
            },
            Opcode::If => Insn::If {
                cond: read_condition(reader)?,
                a: reader.read_u16()?,
                b: reader.read_u16()?,
                target: reader.read_u32()?,
            },
            Opcode::IfZero => Insn::IfZero {
                cond: read_condition(reader)?,
                a: reader.read_u16()?,
                target: reader.read_u32()?,
            },
            Opcode::Binary => {
                let offset = reader.position();
                let tag = reader.read_u8()?;
                let op = BinaryOp::from_u8(tag).ok_or(DecodeError::InvalidTag(tag, offset))?;
                Insn::Binary {
                    op,
                    dst: reader.read_u16()?,
                    a: reader.read_u16()?,
                    b: reader.read_u16()?,
                }
            }
            Opcode::InstanceGet => Insn::InstanceGet {
                dst: reader.read_u16()?,
                object: reader.read_u16()?,
                field: reader.read_u32()?,
            },
            Opcode::InstancePut => Insn::InstancePut {
                src: reader.read_u16()?,
                object: reader.read_u16()?,
                field: reader.read_u32()?,
            },
            Opcode::StaticGet => Insn::StaticGet {
                dst: reader.read_u16()?,
                field: reader.read_u32()?,
            },
            Opcode::StaticPut => Insn::StaticPut {
                src: reader.read_u16()?,
                field: reader.read_u32()?,
            },
            Opcode::InvokeVirtual
            | Opcode::InvokeSuper
            | Opcode::InvokeDirect
            | Opcode::InvokeStatic
            | Opcode::InvokeInterface => {
                let method = reader.read_u32()?;
                let argc = reader.read_u8()? as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(reader.read_u16()?);
                }
                // from_opcode is total over the invoke opcodes matched here
                let kind = InvokeType::from_opcode(opcode).unwrap_or(InvokeType::Virtual);
                Insn::Invoke { kind, method, args }
            }
        };
        Ok(insn)
    }
}

fn read_condition(reader: &mut ImageReader<'_>) -> Result<Condition, DecodeError> {
    let offset = reader.position();
    let tag = reader.read_u8()?;
    Condition::from_u8(tag).ok_or(DecodeError::InvalidTag(tag, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(insn: &Insn) -> Insn {
        let mut writer = ImageWriter::new();
        insn.encode(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ImageReader::new(&bytes);
        let decoded = Insn::decode(&mut reader).unwrap();
        assert!(!reader.has_more(), "trailing bytes after {:?}", insn);
        decoded
    }

    #[test]
    fn test_invoke_layout() {
        let insn = Insn::Invoke {
            kind: InvokeType::Interface,
            method: 3,
            args: vec![4, 7],
        };
        let mut writer = ImageWriter::new();
        insn.encode(&mut writer);
        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::InvokeInterface.to_u8());
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 3);
        assert_eq!(bytes[5], 2);
        assert_eq!(bytes.len(), 10);
        assert_eq!(roundtrip(&insn), insn);
    }

    #[test]
    fn test_branch_and_arithmetic_decode() {
        let branch = Insn::If {
            cond: Condition::Lt,
            a: 1,
            b: 2,
            target: 9,
        };
        assert_eq!(roundtrip(&branch).branch_target(), Some(9));

        let binop = Insn::Binary {
            op: BinaryOp::Ushr,
            dst: 0,
            a: 1,
            b: 2,
        };
        assert_eq!(roundtrip(&binop), binop);
    }

    #[test]
    fn test_invalid_condition_tag() {
        let bytes = [Opcode::IfZero.to_u8(), 42, 0, 0, 0, 0, 0, 0];
        let mut reader = ImageReader::new(&bytes);
        assert_eq!(Insn::decode(&mut reader), Err(DecodeError::InvalidTag(42, 1)));
    }

    #[test]
    fn test_truncated_instruction() {
        let bytes = [Opcode::ConstWide.to_u8(), 0, 0, 1, 2];
        let mut reader = ImageReader::new(&bytes);
        assert!(matches!(
            Insn::decode(&mut reader),
            Err(DecodeError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_pool_refs_and_registers() {
        let get = Insn::InstanceGet {
            dst: 1,
            object: 2,
            field: 5,
        };
        assert_eq!(get.pool_ref(), Some(PoolRef::Field(5)));
        assert_eq!(get.registers(), vec![1, 2]);
        assert_eq!(Insn::ReturnVoid.pool_ref(), None);
        assert_eq!(
            Insn::ConstString { dst: 0, string: 8 }.pool_ref(),
            Some(PoolRef::String(8))
        );
    }
}
