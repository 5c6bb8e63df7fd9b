//! Instruction and code model
//!
//! Method bodies are ordered sequences of [`InsnId`]s into the classpath's
//! instruction arena. Every structural edit goes through the attach/detach
//! primitive in [`edit`], which keeps the body, the reference index and the
//! body's local declarations in step.

mod body;
mod builder;
mod edit;
mod instruction;
mod local;

pub use body::CodeBody;
pub use builder::{InvokeBuilder, LoadStoreBuilder};
pub use instruction::{
    Branch, BranchTest, Const, ConstValue, InsnId, Instruction, Invoke, InvokeKind, LoadStore,
    LoadStoreKind,
};
pub use local::LocalVariable;
