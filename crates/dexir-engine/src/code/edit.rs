//! Structural edits of method bodies
//!
//! Every public edit validates first and only then calls `attach`/`detach`,
//! the only places that touch a body's sequence, the reference index and
//! local ownership.

use super::instruction::{InsnId, Instruction};
use crate::classpath::{Classpath, InsnSlot};
use crate::error::{IrError, IrResult};
use crate::symbols::MethodId;

impl Classpath {
    /// Insert an instruction immediately before `anchor`
    pub fn add_before(
        &mut self,
        anchor: InsnId,
        instruction: impl Into<Instruction>,
    ) -> IrResult<InsnId> {
        let (method, position) = self.locate(anchor)?;
        self.insert(method, position, instruction.into())
    }

    /// Insert an instruction immediately after `anchor`
    pub fn add_after(
        &mut self,
        anchor: InsnId,
        instruction: impl Into<Instruction>,
    ) -> IrResult<InsnId> {
        let (method, position) = self.locate(anchor)?;
        self.insert(method, position + 1, instruction.into())
    }

    /// Append an instruction to the end of a body
    pub fn append(
        &mut self,
        method: MethodId,
        instruction: impl Into<Instruction>,
    ) -> IrResult<InsnId> {
        let position = self.require_body(method)?;
        self.insert(method, position, instruction.into())
    }

    /// Detach an instruction and hand back its value
    ///
    /// The value can be attached again elsewhere. Instructions still
    /// targeted by a branch cannot be removed.
    pub fn remove(&mut self, id: InsnId) -> IrResult<Instruction> {
        let (method, _) = self.locate(id)?;
        if let Some(branch) = self.branches_to(method, id).first() {
            return Err(IrError::BranchTarget(format!(
                "{} is targeted by {} in {}",
                id,
                branch,
                self.method_descriptor(method)
            )));
        }
        self.detach(id).ok_or(IrError::UnknownInstruction(id))
    }

    /// Swap an instruction for another at the same position
    ///
    /// Branches that targeted `old` target the replacement afterwards.
    /// Returns the replacement's id and the old value.
    pub fn replace(
        &mut self,
        old: InsnId,
        instruction: impl Into<Instruction>,
    ) -> IrResult<(InsnId, Instruction)> {
        let instruction = instruction.into();
        let (method, position) = self.locate(old)?;
        self.validate(method, &instruction, true)?;

        let retarget = self.branches_to(method, old);
        let id = self.allocate_id();
        let previous = self.detach(old).ok_or(IrError::UnknownInstruction(old))?;
        self.attach(method, position, id, instruction);
        for branch in retarget.into_iter().chain(std::iter::once(id)) {
            if let Some(Some(slot)) = self.code.get_mut(branch.index()) {
                slot.instruction.retarget(old, id);
            }
        }
        Ok((id, previous))
    }

    fn insert(
        &mut self,
        method: MethodId,
        position: usize,
        instruction: Instruction,
    ) -> IrResult<InsnId> {
        self.validate(method, &instruction, true)?;
        let id = self.allocate_id();
        self.attach(method, position, id, instruction);
        Ok(id)
    }

    /// Append at a pre-reserved id, leaving branch targets to be checked by the caller
    pub(crate) fn append_reserved(
        &mut self,
        method: MethodId,
        id: InsnId,
        instruction: Instruction,
    ) -> IrResult<()> {
        let position = self.require_body(method)?;
        self.validate(method, &instruction, false)?;
        self.attach(method, position, id, instruction);
        Ok(())
    }

    /// Reserve `count` consecutive instruction ids
    pub(crate) fn reserve(&mut self, count: usize) -> InsnId {
        let first = InsnId(self.code.len() as u32);
        self.code.resize_with(self.code.len() + count, || None);
        first
    }

    fn allocate_id(&mut self) -> InsnId {
        self.reserve(1)
    }

    /// Body and position of an attached instruction
    fn locate(&self, id: InsnId) -> IrResult<(MethodId, usize)> {
        let method = self.method_of(id).ok_or(IrError::UnknownInstruction(id))?;
        let position = self
            .body(method)
            .and_then(|body| body.position(id))
            .ok_or(IrError::UnknownInstruction(id))?;
        Ok((method, position))
    }

    /// Length of a method's body, failing if it has none
    fn require_body(&self, method: MethodId) -> IrResult<usize> {
        self.body(method).map(|body| body.len()).ok_or_else(|| {
            IrError::NotLocal(format!("{} has no code", self.method_descriptor(method)))
        })
    }

    /// Attached branches of a body that target `id`
    pub(crate) fn branches_to(&self, method: MethodId, id: InsnId) -> Vec<InsnId> {
        self.body(method)
            .map(|body| {
                body.instructions
                    .iter()
                    .copied()
                    .filter(|&i| {
                        self.instruction(i)
                            .and_then(|insn| insn.branch_target())
                            == Some(id)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check that an instruction can be attached to a body
    fn validate(
        &self,
        method: MethodId,
        instruction: &Instruction,
        check_target: bool,
    ) -> IrResult<()> {
        self.require_body(method)?;

        for local in instruction.locals() {
            if let Some(&owner) = self.local_owners.get(&local) {
                if owner != method {
                    return Err(IrError::ForeignVariable(local));
                }
            }
        }

        if check_target {
            if let Some(target) = instruction.branch_target() {
                if self.method_of(target) != Some(method) {
                    return Err(IrError::BranchTarget(format!(
                        "{} is not attached to {}",
                        target,
                        self.method_descriptor(method)
                    )));
                }
            }
        }

        self.check_shape(instruction, None)
    }

    /// Attach a validated instruction
    fn attach(&mut self, method: MethodId, position: usize, id: InsnId, instruction: Instruction) {
        for (symbol, kind) in instruction.references() {
            self.index.add(symbol, kind, id);
        }

        let mut declared = Vec::new();
        for local in instruction.locals() {
            if !self.local_owners.contains_key(&local) {
                self.local_owners.insert(local, method);
                declared.push(local);
            }
        }

        if let Some(body) = self.methods[method.index()].body.as_mut() {
            body.locals.extend(declared);
            body.instructions.insert(position, id);
        }
        self.code[id.index()] = Some(InsnSlot {
            method,
            instruction,
        });
    }

    /// Detach an attached instruction
    fn detach(&mut self, id: InsnId) -> Option<Instruction> {
        let InsnSlot {
            method,
            instruction,
        } = self.code.get_mut(id.index())?.take()?;

        if let Some(body) = self.methods[method.index()].body.as_mut() {
            body.instructions.retain(|&i| i != id);
        }
        for (symbol, _) in instruction.references() {
            self.index.remove(symbol, id);
        }
        Some(instruction)
    }
}
