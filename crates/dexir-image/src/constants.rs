//! Constant pool for images
//!
//! Strings are stored once; types, prototypes and member references point
//! into the string table (directly or through the type table).

use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use rustc_hash::FxHashMap;

/// A method prototype: return type and parameter types (type indices)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtoRef {
    /// Return type index
    pub return_type: u32,
    /// Parameter type indices
    pub parameters: Vec<u32>,
}

/// A field reference: declaring class, field type and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring class type index
    pub class: u32,
    /// Field type index
    pub ty: u32,
    /// Name string index
    pub name: u32,
}

/// A method reference: declaring class, prototype and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring class type index
    pub class: u32,
    /// Prototype index
    pub proto: u32,
    /// Name string index
    pub name: u32,
}

/// Constant pool containing every symbolic value of an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    /// String constants (names, descriptors, literals)
    pub strings: Vec<String>,
    /// Type descriptors (string indices)
    pub types: Vec<u32>,
    /// Method prototypes
    pub protos: Vec<ProtoRef>,
    /// Field references
    pub fields: Vec<FieldRef>,
    /// Method references
    pub methods: Vec<MethodRef>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Get the descriptor string of a type by type index
    pub fn get_type(&self, index: u32) -> Option<&str> {
        self.types
            .get(index as usize)
            .and_then(|&string| self.get_string(string))
    }

    /// Get a prototype by index
    pub fn get_proto(&self, index: u32) -> Option<&ProtoRef> {
        self.protos.get(index as usize)
    }

    /// Get a field reference by index
    pub fn get_field(&self, index: u32) -> Option<&FieldRef> {
        self.fields.get(index as usize)
    }

    /// Get a method reference by index
    pub fn get_method(&self, index: u32) -> Option<&MethodRef> {
        self.methods.get(index as usize)
    }

    /// Render a prototype as a method descriptor, e.g. `(I)V`
    pub fn proto_descriptor(&self, index: u32) -> Option<String> {
        let proto = self.get_proto(index)?;
        let mut descriptor = String::from("(");
        for &param in &proto.parameters {
            descriptor.push_str(self.get_type(param)?);
        }
        descriptor.push(')');
        descriptor.push_str(self.get_type(proto.return_type)?);
        Some(descriptor)
    }

    /// Encode the constant pool to binary format
    ///
    /// Format:
    /// - String count (u32), then each string: length (u32) + UTF-8 bytes
    /// - Type count (u32), then each: string index (u32)
    /// - Proto count (u32), then each: return type (u32), param count (u32), params (u32 each)
    /// - Field count (u32), then each: class (u32), type (u32), name (u32)
    /// - Method count (u32), then each: class (u32), proto (u32), name (u32)
    pub fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }

        writer.emit_u32(self.types.len() as u32);
        for &ty in &self.types {
            writer.emit_u32(ty);
        }

        writer.emit_u32(self.protos.len() as u32);
        for proto in &self.protos {
            writer.emit_u32(proto.return_type);
            writer.emit_u32(proto.parameters.len() as u32);
            for &param in &proto.parameters {
                writer.emit_u32(param);
            }
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u32(field.class);
            writer.emit_u32(field.ty);
            writer.emit_u32(field.name);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            writer.emit_u32(method.class);
            writer.emit_u32(method.proto);
            writer.emit_u32(method.name);
        }
    }

    /// Decode the constant pool from binary format
    ///
    /// Indices are not range-checked here; see [`crate::verify`].
    pub fn decode(reader: &mut ImageReader<'_>) -> Result<Self, DecodeError> {
        let mut pool = ConstantPool::new();

        let string_count = reader.read_count(4)?;
        pool.strings.reserve(string_count);
        for _ in 0..string_count {
            pool.strings.push(reader.read_string()?);
        }

        let type_count = reader.read_count(4)?;
        pool.types.reserve(type_count);
        for _ in 0..type_count {
            pool.types.push(reader.read_u32()?);
        }

        let proto_count = reader.read_count(8)?;
        pool.protos.reserve(proto_count);
        for _ in 0..proto_count {
            let return_type = reader.read_u32()?;
            let param_count = reader.read_count(4)?;
            let mut parameters = Vec::with_capacity(param_count);
            for _ in 0..param_count {
                parameters.push(reader.read_u32()?);
            }
            pool.protos.push(ProtoRef {
                return_type,
                parameters,
            });
        }

        let field_count = reader.read_count(12)?;
        pool.fields.reserve(field_count);
        for _ in 0..field_count {
            pool.fields.push(FieldRef {
                class: reader.read_u32()?,
                ty: reader.read_u32()?,
                name: reader.read_u32()?,
            });
        }

        let method_count = reader.read_count(12)?;
        pool.methods.reserve(method_count);
        for _ in 0..method_count {
            pool.methods.push(MethodRef {
                class: reader.read_u32()?,
                proto: reader.read_u32()?,
                name: reader.read_u32()?,
            });
        }

        Ok(pool)
    }
}

/// Builder for a [`ConstantPool`] that deduplicates every entry
///
/// Asking for the same string, type or member reference twice returns the
/// index handed out the first time.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    pool: ConstantPool,
    strings: FxHashMap<String, u32>,
    types: FxHashMap<String, u32>,
    protos: FxHashMap<ProtoRef, u32>,
    fields: FxHashMap<FieldRef, u32>,
    methods: FxHashMap<MethodRef, u32>,
}

impl ConstantPoolBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string
    pub fn string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.strings.get(value) {
            return index;
        }
        let index = self.pool.strings.len() as u32;
        self.pool.strings.push(value.to_string());
        self.strings.insert(value.to_string(), index);
        index
    }

    /// Intern a type descriptor
    pub fn ty(&mut self, descriptor: &str) -> u32 {
        if let Some(&index) = self.types.get(descriptor) {
            return index;
        }
        let string = self.string(descriptor);
        let index = self.pool.types.len() as u32;
        self.pool.types.push(string);
        self.types.insert(descriptor.to_string(), index);
        index
    }

    /// Intern a prototype from descriptor strings
    pub fn proto(&mut self, return_type: &str, parameters: &[String]) -> u32 {
        let proto = ProtoRef {
            return_type: self.ty(return_type),
            parameters: parameters.iter().map(|p| self.ty(p)).collect(),
        };
        if let Some(&index) = self.protos.get(&proto) {
            return index;
        }
        let index = self.pool.protos.len() as u32;
        self.pool.protos.push(proto.clone());
        self.protos.insert(proto, index);
        index
    }

    /// Intern a field reference
    pub fn field(&mut self, class: &str, name: &str, ty: &str) -> u32 {
        let field = FieldRef {
            class: self.ty(class),
            ty: self.ty(ty),
            name: self.string(name),
        };
        if let Some(&index) = self.fields.get(&field) {
            return index;
        }
        let index = self.pool.fields.len() as u32;
        self.pool.fields.push(field);
        self.fields.insert(field, index);
        index
    }

    /// Intern a method reference
    pub fn method(
        &mut self,
        class: &str,
        name: &str,
        return_type: &str,
        parameters: &[String],
    ) -> u32 {
        let method = MethodRef {
            class: self.ty(class),
            proto: self.proto(return_type, parameters),
            name: self.string(name),
        };
        if let Some(&index) = self.methods.get(&method) {
            return index;
        }
        let index = self.pool.methods.len() as u32;
        self.pool.methods.push(method);
        self.methods.insert(method, index);
        index
    }

    /// Current pool (for size checks while building)
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Finish building
    pub fn build(self) -> ConstantPool {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_deduplicates() {
        let mut builder = ConstantPoolBuilder::new();
        let a = builder.string("hello");
        let b = builder.string("hello");
        assert_eq!(a, b);

        let url = builder.ty("Ljava/net/URL;");
        assert_eq!(builder.ty("Ljava/net/URL;"), url);

        let stream = "Ljava/io/InputStream;".to_string();
        let m1 = builder.method("Ljava/net/URL;", "openStream", &stream, &[]);
        let m2 = builder.method("Ljava/net/URL;", "openStream", &stream, &[]);
        assert_eq!(m1, m2);

        let pool = builder.build();
        assert_eq!(pool.methods.len(), 1);
        assert_eq!(pool.protos.len(), 1);
        // "hello", URL, InputStream, "openStream"
        assert_eq!(pool.strings.len(), 4);
    }

    #[test]
    fn test_descriptor_lookup() {
        let mut builder = ConstantPoolBuilder::new();
        let params = vec!["Ljava/lang/String;".to_string(), "I".to_string()];
        let proto = builder.proto("V", &params);
        let field = builder.field("Ljava/lang/System;", "out", "Ljava/io/PrintStream;");
        let pool = builder.build();

        assert_eq!(
            pool.proto_descriptor(proto).as_deref(),
            Some("(Ljava/lang/String;I)V")
        );
        let field = pool.get_field(field).unwrap();
        assert_eq!(pool.get_type(field.class), Some("Ljava/lang/System;"));
        assert_eq!(pool.get_string(field.name), Some("out"));
    }

    #[test]
    fn test_pool_roundtrip() {
        let mut builder = ConstantPoolBuilder::new();
        builder.string("literal");
        builder.field("LA;", "x", "I");
        builder.method("LA;", "run", "V", &["J".to_string()]);
        let pool = builder.build();

        let mut writer = ImageWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let decoded = ConstantPool::decode(&mut ImageReader::new(&bytes)).unwrap();
        assert_eq!(decoded, pool);
    }

    #[test]
    fn test_missing_entries() {
        let pool = ConstantPool::new();
        assert_eq!(pool.get_string(0), None);
        assert_eq!(pool.get_type(3), None);
        assert_eq!(pool.proto_descriptor(0), None);
    }
}
