//! DEXIR image definitions
//!
//! This crate provides the binary image container, constant pool, raw
//! register-based instruction set and structural verifier consumed by the
//! dexir IR engine.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod constants;
pub mod encoder;
pub mod image;
pub mod insn;
pub mod opcode;
pub mod verify;

pub use constants::{ConstantPool, ConstantPoolBuilder, FieldRef, MethodRef, ProtoRef};
pub use encoder::{DecodeError, ImageReader, ImageWriter};
pub use image::{access, flags, register_kind, ClassDef, CodeItem, FieldDef, Image, ImageError, MethodDef};
pub use insn::{BinaryOp, Condition, Insn, InvokeType, PoolRef};
pub use opcode::Opcode;
pub use verify::{verify_image, VerifyError};
