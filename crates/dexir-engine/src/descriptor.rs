//! Type and method descriptors
//!
//! Descriptors use the JVM grammar shared by dex: `V Z B C S I J F D` for
//! primitives, `Lpkg/Name;` for classes and `[` prefixes for arrays.

use crate::error::{IrError, IrResult};
use dexir_image::register_kind;
use std::fmt;
use std::str::FromStr;

/// Deepest array type an image may name
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Kind of value a local variable holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// Object or array reference
    Reference,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
}

impl ValueKind {
    /// Long and double occupy two registers
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    /// Number of registers a value of this kind occupies
    pub fn slots(self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// Check whether a value of this kind can be passed where `expected` is declared
    ///
    /// The sub-word integer kinds share the `int` register representation.
    pub fn is_assignable_to(self, expected: ValueKind) -> bool {
        self == expected || (self.is_int_like() && expected.is_int_like())
    }

    fn is_int_like(self) -> bool {
        matches!(
            self,
            ValueKind::Boolean
                | ValueKind::Byte
                | ValueKind::Char
                | ValueKind::Short
                | ValueKind::Int
        )
    }

    /// Register kind tag used in code items
    pub fn register_kind(self) -> u8 {
        match self {
            ValueKind::Reference => register_kind::REFERENCE,
            ValueKind::Boolean => register_kind::BOOLEAN,
            ValueKind::Byte => register_kind::BYTE,
            ValueKind::Char => register_kind::CHAR,
            ValueKind::Short => register_kind::SHORT,
            ValueKind::Int => register_kind::INT,
            ValueKind::Long => register_kind::LONG,
            ValueKind::Float => register_kind::FLOAT,
            ValueKind::Double => register_kind::DOUBLE,
        }
    }

    /// Inverse of [`ValueKind::register_kind`]; `None` for the high half of a pair
    pub fn from_register_kind(tag: u8) -> Option<Self> {
        match tag {
            register_kind::REFERENCE => Some(ValueKind::Reference),
            register_kind::BOOLEAN => Some(ValueKind::Boolean),
            register_kind::BYTE => Some(ValueKind::Byte),
            register_kind::CHAR => Some(ValueKind::Char),
            register_kind::SHORT => Some(ValueKind::Short),
            register_kind::INT => Some(ValueKind::Int),
            register_kind::LONG => Some(ValueKind::Long),
            register_kind::FLOAT => Some(ValueKind::Float),
            register_kind::DOUBLE => Some(ValueKind::Double),
            _ => None,
        }
    }

    /// Short name used by the pretty printer
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Reference => "ref",
            ValueKind::Boolean => "boolean",
            ValueKind::Byte => "byte",
            ValueKind::Char => "char",
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field or return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// `V`, only valid as a return type
    Void,
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// Class type by internal name, e.g. `java/net/URL`
    Object(String),
    /// Array of the element type
    Array(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Class type from its internal name (`java/lang/String`)
    pub fn object(internal_name: impl Into<String>) -> Self {
        TypeDescriptor::Object(internal_name.into())
    }

    /// Array type with the given element type
    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    /// Parse a complete descriptor
    pub fn parse(descriptor: &str) -> IrResult<Self> {
        match Self::parse_prefix(descriptor) {
            Some((ty, "")) => Ok(ty),
            _ => Err(IrError::InvalidDescriptor(descriptor.to_string())),
        }
    }

    /// Parse one descriptor from the front of `input`, returning the rest
    fn parse_prefix(input: &str) -> Option<(Self, &str)> {
        let dimensions = input.bytes().take_while(|&b| b == b'[').count();
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return None;
        }
        let (mut ty, rest) = Self::parse_element(&input[dimensions..])?;
        if dimensions > 0 && ty == TypeDescriptor::Void {
            return None;
        }
        for _ in 0..dimensions {
            ty = TypeDescriptor::array(ty);
        }
        Some((ty, rest))
    }

    fn parse_element(input: &str) -> Option<(Self, &str)> {
        let mut chars = input.chars();
        let ty = match chars.next()? {
            'V' => TypeDescriptor::Void,
            'Z' => TypeDescriptor::Boolean,
            'B' => TypeDescriptor::Byte,
            'C' => TypeDescriptor::Char,
            'S' => TypeDescriptor::Short,
            'I' => TypeDescriptor::Int,
            'J' => TypeDescriptor::Long,
            'F' => TypeDescriptor::Float,
            'D' => TypeDescriptor::Double,
            'L' => {
                let end = input.find(';')?;
                let name = &input[1..end];
                if name.is_empty() {
                    return None;
                }
                return Some((TypeDescriptor::object(name), &input[end + 1..]));
            }
            _ => return None,
        };
        Some((ty, chars.as_str()))
    }

    /// Kind of a value of this type; `None` for `void`
    pub fn value_kind(&self) -> Option<ValueKind> {
        Some(match self {
            TypeDescriptor::Void => return None,
            TypeDescriptor::Boolean => ValueKind::Boolean,
            TypeDescriptor::Byte => ValueKind::Byte,
            TypeDescriptor::Char => ValueKind::Char,
            TypeDescriptor::Short => ValueKind::Short,
            TypeDescriptor::Int => ValueKind::Int,
            TypeDescriptor::Long => ValueKind::Long,
            TypeDescriptor::Float => ValueKind::Float,
            TypeDescriptor::Double => ValueKind::Double,
            TypeDescriptor::Object(_) | TypeDescriptor::Array(_) => ValueKind::Reference,
        })
    }

    /// Class or array type
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::Object(_) | TypeDescriptor::Array(_))
    }

    /// `void`
    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Void)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => f.write_str("V"),
            TypeDescriptor::Boolean => f.write_str("Z"),
            TypeDescriptor::Byte => f.write_str("B"),
            TypeDescriptor::Char => f.write_str("C"),
            TypeDescriptor::Short => f.write_str("S"),
            TypeDescriptor::Int => f.write_str("I"),
            TypeDescriptor::Long => f.write_str("J"),
            TypeDescriptor::Float => f.write_str("F"),
            TypeDescriptor::Double => f.write_str("D"),
            TypeDescriptor::Object(name) => write!(f, "L{};", name),
            TypeDescriptor::Array(element) => write!(f, "[{}", element),
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Declared parameter types, receiver excluded
    pub parameters: Vec<TypeDescriptor>,
    /// Return type
    pub return_type: TypeDescriptor,
}

impl MethodSignature {
    /// Signature from a return type and parameter types
    pub fn new(
        return_type: TypeDescriptor,
        parameters: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
            return_type,
        }
    }

    /// Parse `(params)ret`
    pub fn parse(descriptor: &str) -> IrResult<Self> {
        let invalid = || IrError::InvalidDescriptor(descriptor.to_string());

        let mut rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
        let mut parameters = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = TypeDescriptor::parse_prefix(rest).ok_or_else(invalid)?;
            if ty.is_void() {
                return Err(invalid());
            }
            parameters.push(ty);
            rest = tail;
        }
        let return_type = TypeDescriptor::parse(&rest[1..]).map_err(|_| invalid())?;

        Ok(Self {
            parameters,
            return_type,
        })
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Parameter descriptors as strings, for constant pool interning
    pub(crate) fn parameter_strings(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.to_string()).collect()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.parameters {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl FromStr for MethodSignature {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
