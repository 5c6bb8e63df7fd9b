//! Image container format

use crate::constants::ConstantPool;
use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use crate::insn::Insn;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Magic number for image files: "DXIR"
pub const MAGIC: [u8; 4] = *b"DXIR";

/// Current image format version
pub const VERSION: u32 = 1;

/// Header size: magic + version + flags + checksum + signature
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 32;

const SIGNATURE_OFFSET: usize = 16;

/// Image encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected DXIR, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload
        actual: u32,
    },

    /// SHA-256 signature mismatch
    #[error("Signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch {
        /// Signature stored in the header (hex)
        expected: String,
        /// Signature of the payload (hex)
        actual: String,
    },

    /// Bytes left over after the class table
    #[error("Trailing data: {0} bytes after the class table")]
    TrailingData(usize),
}

/// Image flags
pub mod flags {
    /// Source file names are present on class definitions
    pub const HAS_SOURCE_FILES: u32 = 1 << 0;
}

/// Access flags for classes and members
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u32 = 0x0001;
    /// Visible to the declaring class only
    pub const PRIVATE: u32 = 0x0002;
    /// Visible to package and subclasses
    pub const PROTECTED: u32 = 0x0004;
    /// Not bound to an instance
    pub const STATIC: u32 = 0x0008;
    /// Not overridable / assignable once
    pub const FINAL: u32 = 0x0010;
    /// Class is an interface
    pub const INTERFACE: u32 = 0x0200;
    /// No implementation
    pub const ABSTRACT: u32 = 0x0400;
    /// Implemented outside the image
    pub const NATIVE: u32 = 0x0100;
    /// Method is a constructor
    pub const CONSTRUCTOR: u32 = 0x1_0000;
}

/// Register kind tags in a code item's register table
pub mod register_kind {
    /// Object or array reference
    pub const REFERENCE: u8 = 0;
    /// `boolean`
    pub const BOOLEAN: u8 = 1;
    /// `byte`
    pub const BYTE: u8 = 2;
    /// `char`
    pub const CHAR: u8 = 3;
    /// `short`
    pub const SHORT: u8 = 4;
    /// `int`
    pub const INT: u8 = 5;
    /// `long` (low half)
    pub const LONG: u8 = 6;
    /// `float`
    pub const FLOAT: u8 = 7;
    /// `double` (low half)
    pub const DOUBLE: u8 = 8;
    /// High half of a `long` or `double` pair
    pub const WIDE_HIGH: u8 = 9;

    /// Check if a tag starts a register pair
    pub fn is_wide(tag: u8) -> bool {
        tag == LONG || tag == DOUBLE
    }

    /// Check if a tag is known
    pub fn is_valid(tag: u8) -> bool {
        tag <= WIDE_HIGH
    }
}

/// A decoded image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Image flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Class definitions
    pub classes: Vec<ClassDef>,
}

/// Class definition
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    /// Type index of the class
    pub class: u32,
    /// Access flags
    pub access: u32,
    /// Superclass type index
    pub superclass: Option<u32>,
    /// Implemented interface type indices
    pub interfaces: Vec<u32>,
    /// Source file string index
    pub source_file: Option<u32>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
}

/// Field declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field reference index
    pub field: u32,
    /// Access flags
    pub access: u32,
}

/// Method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method reference index
    pub method: u32,
    /// Access flags
    pub access: u32,
    /// Code, absent for abstract and native methods
    pub code: Option<CodeItem>,
}

/// Method body in register form
///
/// Parameters occupy the last `ins_size` registers, receiver first.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeItem {
    /// Number of registers
    pub registers_size: u16,
    /// Number of registers holding incoming arguments
    pub ins_size: u16,
    /// Kind tag per register (see [`register_kind`])
    pub register_kinds: Vec<u8>,
    /// Instruction stream
    pub insns: Vec<Insn>,
}

impl ClassDef {
    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u32(self.class);
        writer.emit_u32(self.access);
        writer.emit_optional_u32(self.superclass);
        writer.emit_u32(self.interfaces.len() as u32);
        for &interface in &self.interfaces {
            writer.emit_u32(interface);
        }
        writer.emit_optional_u32(self.source_file);

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u32(field.field);
            writer.emit_u32(field.access);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(writer);
        }
    }

    fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let class = reader.read_u32()?;
        let access = reader.read_u32()?;
        let superclass = reader.read_optional_u32()?;
        let interface_count = reader.read_count(4)?;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(reader.read_u32()?);
        }
        let source_file = reader.read_optional_u32()?;

        let field_count = reader.read_count(8)?;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(FieldDef {
                field: reader.read_u32()?,
                access: reader.read_u32()?,
            });
        }

        let method_count = reader.read_count(9)?;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(MethodDef::decode(reader)?);
        }

        Ok(Self {
            class,
            access,
            superclass,
            interfaces,
            source_file,
            fields,
            methods,
        })
    }
}

impl MethodDef {
    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u32(self.method);
        writer.emit_u32(self.access);
        match &self.code {
            Some(code) => {
                writer.emit_u8(1);
                code.encode(writer);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let method = reader.read_u32()?;
        let access = reader.read_u32()?;
        let offset = reader.position();
        let code = match reader.read_u8()? {
            0 => None,
            1 => Some(CodeItem::decode(reader)?),
            tag => return Err(DecodeError::InvalidTag(tag, offset)),
        };
        Ok(Self {
            method,
            access,
            code,
        })
    }
}

impl CodeItem {
    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u16(self.registers_size);
        writer.emit_u16(self.ins_size);
        writer.emit_bytes(&self.register_kinds);
        writer.emit_u32(self.insns.len() as u32);
        for insn in &self.insns {
            insn.encode(writer);
        }
    }

    fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let registers_size = reader.read_u16()?;
        let ins_size = reader.read_u16()?;
        let register_kinds = reader.read_bytes(registers_size as usize)?.to_vec();
        let insn_count = reader.read_count(1)?;
        let mut insns = Vec::with_capacity(insn_count);
        for _ in 0..insn_count {
            insns.push(Insn::decode(reader)?);
        }
        Ok(Self {
            registers_size,
            ins_size,
            register_kinds,
            insns,
        })
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    /// Create a new empty image
    pub fn new() -> Self {
        Self {
            flags: 0,
            constants: ConstantPool::new(),
            classes: Vec::new(),
        }
    }

    /// Encode the image to binary format
    ///
    /// Format:
    /// - Header: magic (4) + version (u32) + flags (u32) + crc32 (u32) + sha256 (32)
    /// - Constant pool
    /// - Class table
    ///
    /// Both the CRC32 and the SHA-256 cover everything after the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ImageWriter::new();

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_u32();
        writer.emit_bytes(&[0u8; 32]);
        debug_assert_eq!(writer.offset(), HEADER_SIZE);

        self.constants.encode(&mut writer);

        writer.emit_u32(self.classes.len() as u32);
        for class in &self.classes {
            class.encode(&mut writer);
        }

        let payload = &writer.buffer()[HEADER_SIZE..];
        let checksum = crc32fast::hash(payload);
        let signature: [u8; 32] = Sha256::digest(payload).into();
        writer.patch_u32(checksum_offset, checksum);
        writer.patch_bytes(SIGNATURE_OFFSET, &signature);

        writer.into_bytes()
    }

    /// Decode an image from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let mut reader = ImageReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;
        let stored_signature = reader.read_bytes(32)?;

        let payload = &data[HEADER_SIZE..];
        let calculated_checksum = crc32fast::hash(payload);
        if stored_checksum != calculated_checksum {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }
        let calculated_signature = Sha256::digest(payload);
        if stored_signature != calculated_signature.as_slice() {
            return Err(ImageError::SignatureMismatch {
                expected: hex::encode(stored_signature),
                actual: hex::encode(calculated_signature),
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let class_count = reader.read_count(4)?;
        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            classes.push(ClassDef::decode(&mut reader)?);
        }

        if reader.has_more() {
            return Err(ImageError::TrailingData(reader.remaining()));
        }

        Ok(Self {
            flags,
            constants,
            classes,
        })
    }

    /// Hex-encoded SHA-256 of an encoded image's payload, read from its header
    pub fn signature_hex(data: &[u8]) -> Option<String> {
        data.get(SIGNATURE_OFFSET..HEADER_SIZE).map(hex::encode)
    }
}
