//! Symbol model: type, method and field mirrors
//!
//! Mirrors live in the [`Classpath`](crate::Classpath) arenas and are
//! addressed by the typed ids defined here. An id is only meaningful for
//! the classpath that issued it.

use crate::code::CodeBody;
use crate::descriptor::{MethodSignature, TypeDescriptor};
use dexir_image::access;
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Get the raw arena index
            pub fn as_u32(self) -> u32 {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle to a [`TypeMirror`]
    TypeId,
    "type#"
);
arena_id!(
    /// Handle to a [`MethodMirror`]
    MethodId,
    "method#"
);
arena_id!(
    /// Handle to a [`FieldMirror`]
    FieldId,
    "field#"
);

/// Static marker of a member
///
/// `Unknown` is allowed for members resolved from use sites whose shape
/// does not say; it must be refined before the member is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriState {
    /// Known static
    True,
    /// Known instance
    False,
    /// Not known yet
    Unknown,
}

impl TriState {
    /// Known marker from a boolean
    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }

    /// The known value, if any
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        }
    }

    /// Check if the marker is known
    pub fn is_known(self) -> bool {
        self != TriState::Unknown
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        TriState::from_bool(value)
    }
}

/// A type known to the classpath
#[derive(Debug, Clone)]
pub struct TypeMirror {
    pub(crate) descriptor: TypeDescriptor,
    pub(crate) variant: TypeVariant,
}

/// Local or external payload of a [`TypeMirror`]
#[derive(Debug, Clone)]
pub enum TypeVariant {
    /// Defined by a decoded image or by [`Classpath::define_type`](crate::Classpath::define_type)
    Local(LocalType),
    /// Assumed present outside the classpath
    External(ExternalType),
}

/// Definition data of a local type
#[derive(Debug, Clone)]
pub struct LocalType {
    /// Access flags
    pub access: u32,
    /// Superclass
    pub superclass: Option<TypeId>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeId>,
    /// Source file name
    pub source_file: Option<String>,
    pub(crate) methods: Vec<MethodId>,
    pub(crate) fields: Vec<FieldId>,
}

impl LocalType {
    /// Declared methods in declaration order
    pub fn methods(&self) -> &[MethodId] {
        &self.methods
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }
}

/// An assumed-present type
#[derive(Debug, Clone, Default)]
pub struct ExternalType {
    /// Whether the type is an interface; a use site cannot always tell
    pub interface: bool,
}

/// Header of a type to define
#[derive(Debug, Clone, Default)]
pub struct TypeDefinition {
    /// Access flags
    pub access: u32,
    /// Superclass
    pub superclass: Option<TypeId>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeId>,
    /// Source file name
    pub source_file: Option<String>,
}

impl TypeMirror {
    pub(crate) fn external(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            variant: TypeVariant::External(ExternalType::default()),
        }
    }

    /// Descriptor of this type
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Local or external payload
    pub fn variant(&self) -> &TypeVariant {
        &self.variant
    }

    /// Check if this type is defined in the classpath
    pub fn is_local(&self) -> bool {
        matches!(self.variant, TypeVariant::Local(_))
    }

    /// Local payload, if this type is local
    pub fn as_local(&self) -> Option<&LocalType> {
        match &self.variant {
            TypeVariant::Local(local) => Some(local),
            TypeVariant::External(_) => None,
        }
    }

    pub(crate) fn as_local_mut(&mut self) -> Option<&mut LocalType> {
        match &mut self.variant {
            TypeVariant::Local(local) => Some(local),
            TypeVariant::External(_) => None,
        }
    }

    /// Whether invocations on this type dispatch through an interface
    pub fn is_interface(&self) -> bool {
        match &self.variant {
            TypeVariant::Local(local) => local.access & access::INTERFACE != 0,
            TypeVariant::External(external) => external.interface,
        }
    }
}

/// A method known to the classpath
#[derive(Debug, Clone)]
pub struct MethodMirror {
    pub(crate) owner: TypeId,
    pub(crate) name: String,
    pub(crate) signature: MethodSignature,
    pub(crate) is_static: TriState,
    pub(crate) declaration: Option<u32>,
    pub(crate) body: Option<CodeBody>,
}

impl MethodMirror {
    /// Declaring type
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method signature
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Static marker
    pub fn is_static(&self) -> TriState {
        self.is_static
    }

    /// Access flags, for methods declared by a local type
    pub fn declaration(&self) -> Option<u32> {
        self.declaration
    }

    /// Code body, for local methods with code
    pub fn body(&self) -> Option<&CodeBody> {
        self.body.as_ref()
    }

    /// Check if the method is an instance initializer
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

/// A field known to the classpath
#[derive(Debug, Clone)]
pub struct FieldMirror {
    pub(crate) owner: TypeId,
    pub(crate) name: String,
    pub(crate) ty: TypeDescriptor,
    pub(crate) is_static: TriState,
    pub(crate) declaration: Option<u32>,
}

impl FieldMirror {
    /// Declaring type
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    /// Static marker
    pub fn is_static(&self) -> TriState {
        self.is_static
    }

    /// Access flags, for fields declared by a local type
    pub fn declaration(&self) -> Option<u32> {
        self.declaration
    }
}
