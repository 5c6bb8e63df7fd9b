//! Register allocation for encoding
//!
//! Locals get registers only while a body is being encoded. Non-parameter
//! locals take the low registers in first-use order; parameters take the
//! highest registers, receiver first. Wide kinds take a register pair whose
//! high half is tagged [`register_kind::WIDE_HIGH`].

use crate::classpath::Classpath;
use crate::code::{CodeBody, LocalVariable};
use crate::error::{IrError, IrResult};
use dexir_image::register_kind;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug)]
pub(crate) struct RegisterMap {
    registers: FxHashMap<LocalVariable, u16>,
    kinds: Vec<u8>,
    ins_size: u16,
}

impl RegisterMap {
    pub(crate) fn allocate(classpath: &Classpath, body: &CodeBody, limit: u32) -> IrResult<Self> {
        let parameters: FxHashSet<LocalVariable> = body.parameters().iter().copied().collect();
        let mut seen = FxHashSet::default();
        let mut locals = Vec::new();
        for &id in body.instructions() {
            let Some(instruction) = classpath.instruction(id) else {
                continue;
            };
            for local in instruction.locals() {
                if !parameters.contains(&local) && seen.insert(local) {
                    locals.push(local);
                }
            }
        }

        let slots = |locals: &[LocalVariable]| -> usize {
            locals.iter().map(|l| l.kind().slots() as usize).sum()
        };
        let low = slots(&locals);
        let ins = slots(body.parameters());
        let total = low + ins;
        if total > limit as usize || total > u16::MAX as usize {
            return Err(IrError::CapacityExceeded {
                what: "registers",
                count: total,
                limit: limit as usize,
            });
        }

        let mut map = Self {
            registers: FxHashMap::default(),
            kinds: Vec::with_capacity(total),
            ins_size: ins as u16,
        };
        for local in locals.iter().chain(body.parameters()) {
            map.assign(*local);
        }
        Ok(map)
    }

    fn assign(&mut self, local: LocalVariable) {
        let register = self.kinds.len() as u16;
        self.registers.insert(local, register);
        self.kinds.push(local.kind().register_kind());
        if local.kind().is_wide() {
            self.kinds.push(register_kind::WIDE_HIGH);
        }
    }

    pub(crate) fn register(&self, local: LocalVariable) -> IrResult<u16> {
        self.registers
            .get(&local)
            .copied()
            .ok_or(IrError::ForeignVariable(local))
    }

    pub(crate) fn registers_size(&self) -> u16 {
        self.kinds.len() as u16
    }

    pub(crate) fn ins_size(&self) -> u16 {
        self.ins_size
    }

    pub(crate) fn into_kinds(self) -> Vec<u8> {
        self.kinds
    }
}
