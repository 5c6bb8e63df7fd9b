//! DEXIR engine
//!
//! Decodes dexir images into a classpath-wide symbol graph, indexes which
//! instructions reference which symbols, lets method bodies be edited while
//! keeping that index exact, and encodes the result back into an image.
//!
//! ```no_run
//! use dexir_engine::{session, Classpath, ReferenceKind, TriState, TypeDescriptor, MethodSignature};
//!
//! # fn main() -> dexir_engine::IrResult<()> {
//! let mut classpath = session::load("app.dxir")?;
//! let url = classpath.type_mirror(&TypeDescriptor::object("java/net/URL"))?;
//! let sig = MethodSignature::new(TypeDescriptor::object("java/io/InputStream"), vec![]);
//! let open_stream = classpath.method(url, "openStream", &sig, TriState::False)?;
//! for reference in classpath.references(open_stream).list_references(ReferenceKind::Invoke) {
//!     println!("{}", reference.instruction());
//! }
//! session::save(&classpath, "app.out.dxir")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod alloc;
pub mod classpath;
pub mod code;
pub mod config;
pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod pretty;
pub mod references;
pub mod session;
pub mod symbols;

pub use classpath::Classpath;
pub use code::{
    Branch, BranchTest, CodeBody, Const, ConstValue, InsnId, Instruction, Invoke, InvokeBuilder,
    InvokeKind, LoadStore, LoadStoreBuilder, LoadStoreKind, LocalVariable,
};
pub use config::{CodecConfig, ConfigError};
pub use decoder::{decode, Decoder};
pub use descriptor::{MethodSignature, TypeDescriptor, ValueKind};
pub use encoder::{encode, Encoder};
pub use error::{IrError, IrResult};
pub use references::{Reference, ReferenceCursor, ReferenceKind, References, Symbol};
pub use session::Session;
pub use symbols::{
    ExternalType, FieldId, FieldMirror, LocalType, MethodId, MethodMirror, TriState,
    TypeDefinition, TypeId, TypeMirror, TypeVariant,
};

// Raw image types clients need to build instructions
pub use dexir_image::{access, BinaryOp, Condition};
