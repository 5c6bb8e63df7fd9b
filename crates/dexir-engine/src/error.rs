//! Engine errors

use crate::code::{InsnId, LocalVariable};
use crate::config::ConfigError;
use crate::references::Symbol;
use dexir_image::{ImageError, VerifyError};
use thiserror::Error;

/// Result alias used throughout the engine
pub type IrResult<T> = Result<T, IrError>;

/// Errors raised while decoding, editing or encoding a classpath
#[derive(Debug, Error)]
pub enum IrError {
    /// Structurally invalid image
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    /// A type is defined twice
    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    /// Static marker or result binding disagrees with what is already known
    #[error("Signature conflict: {0}")]
    SignatureConflict(String),

    /// Operand count or kind does not match the target
    #[error("Arity mismatch: {0}")]
    ArityMismatch(String),

    /// New-instance invoke of something other than `<init>`
    #[error("Not a constructor: {0}")]
    NotAConstructor(String),

    /// Reference set changed while a cursor was walking it
    #[error("Concurrent modification of references to {0:?}")]
    ConcurrentModification(Symbol),

    /// Member used in code whose static marker is still unknown
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// An encoded limit was exceeded
    #[error("Capacity exceeded: {what} ({count} > {limit})")]
    CapacityExceeded {
        /// Which limit
        what: &'static str,
        /// Required amount
        count: usize,
        /// Configured maximum
        limit: usize,
    },

    /// A body that would lower to code the image verifier rejects
    #[error("Invalid body: {0}")]
    InvalidBody(String),

    /// Descriptor that does not parse or is not allowed here
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Member declared twice on the same type
    #[error("Duplicate member: {0}")]
    DuplicateMember(String),

    /// Declaration on a type that is not defined in this classpath
    #[error("Not a local type: {0}")]
    NotLocal(String),

    /// Instruction id is not attached to any body
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(InsnId),

    /// Invalid branch target, or removal of a targeted instruction
    #[error("Branch target: {0}")]
    BranchTarget(String),

    /// Local variable already belongs to another method body
    #[error("Local variable {0} belongs to another method body")]
    ForeignVariable(LocalVariable),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ImageError> for IrError {
    fn from(err: ImageError) -> Self {
        IrError::MalformedImage(err.to_string())
    }
}

impl From<VerifyError> for IrError {
    fn from(err: VerifyError) -> Self {
        IrError::MalformedImage(err.to_string())
    }
}
