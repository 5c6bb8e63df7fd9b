//! Method bodies

use super::instruction::InsnId;
use super::local::LocalVariable;

/// Code of a local method
#[derive(Debug, Clone, Default)]
pub struct CodeBody {
    pub(crate) parameters: Vec<LocalVariable>,
    pub(crate) locals: Vec<LocalVariable>,
    pub(crate) instructions: Vec<InsnId>,
}

impl CodeBody {
    /// Incoming arguments, receiver first for instance methods
    pub fn parameters(&self) -> &[LocalVariable] {
        &self.parameters
    }

    /// Every local declared in this body, parameters first, then in order of first attach
    pub fn locals(&self) -> &[LocalVariable] {
        &self.locals
    }

    /// Attached instructions in program order
    pub fn instructions(&self) -> &[InsnId] {
        &self.instructions
    }

    /// Number of attached instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if the body has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Position of an instruction in this body
    pub fn position(&self, insn: InsnId) -> Option<usize> {
        self.instructions.iter().position(|&i| i == insn)
    }
}
