//! Instruction values
//!
//! Instructions are immutable once built. Symbol operands are classpath
//! handles, value operands are [`LocalVariable`]s and branch targets are
//! [`InsnId`]s of the same body.

use super::builder::{InvokeBuilder, LoadStoreBuilder};
use super::local::LocalVariable;
use crate::references::{ReferenceKind, Symbol};
use crate::symbols::{FieldId, MethodId, TypeId};
use dexir_image::{BinaryOp, Condition};
use std::fmt;

/// Handle to an instruction in the classpath's instruction arena
///
/// Ids are never reused: a detached instruction's id stays dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub(crate) u32);

impl InsnId {
    /// Get the raw arena index
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insn#{}", self.0)
    }
}

/// Flavor of an invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Dispatch chosen from the target: static, virtual or interface
    Normal,
    /// Non-virtual call of an instance method (private, super or constructor chaining)
    Special,
    /// Allocate an instance of the constructor's owner and run the constructor
    NewInstance,
}

/// Method invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    pub(crate) kind: InvokeKind,
    pub(crate) method: MethodId,
    pub(crate) owner: TypeId,
    pub(crate) parameters: Vec<LocalVariable>,
    pub(crate) result: Option<LocalVariable>,
}

impl Invoke {
    /// Start building an invoke
    pub fn builder() -> InvokeBuilder {
        InvokeBuilder::new()
    }

    /// Invoke flavor
    pub fn kind(&self) -> InvokeKind {
        self.kind
    }

    /// Target method
    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Arguments, receiver first for instance targets
    ///
    /// For [`InvokeKind::NewInstance`] the receiver is the allocated
    /// instance, which is [`Invoke::result`], and is not listed here.
    pub fn parameters(&self) -> &[LocalVariable] {
        &self.parameters
    }

    /// Result binding
    pub fn result(&self) -> Option<LocalVariable> {
        self.result
    }
}

/// Value loaded by a [`Const`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// `null`
    Null,
    /// 32-bit integer (also used for sub-word kinds)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// String literal
    String(String),
    /// Class literal
    Class(TypeId),
}

/// Constant load
#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub(crate) target: LocalVariable,
    pub(crate) value: ConstValue,
}

impl Const {
    /// Load a constant into `target`
    pub fn new(target: LocalVariable, value: ConstValue) -> Self {
        Self { target, value }
    }

    /// `target = null`
    pub fn null(target: LocalVariable) -> Self {
        Self::new(target, ConstValue::Null)
    }

    /// `target = value` (int)
    pub fn int(target: LocalVariable, value: i32) -> Self {
        Self::new(target, ConstValue::Int(value))
    }

    /// `target = value` (long)
    pub fn long(target: LocalVariable, value: i64) -> Self {
        Self::new(target, ConstValue::Long(value))
    }

    /// `target = value` (float)
    pub fn float(target: LocalVariable, value: f32) -> Self {
        Self::new(target, ConstValue::Float(value))
    }

    /// `target = value` (double)
    pub fn double(target: LocalVariable, value: f64) -> Self {
        Self::new(target, ConstValue::Double(value))
    }

    /// `target = "value"`
    pub fn string(target: LocalVariable, value: impl Into<String>) -> Self {
        Self::new(target, ConstValue::String(value.into()))
    }

    /// `target = Type.class`
    pub fn class(target: LocalVariable, ty: TypeId) -> Self {
        Self::new(target, ConstValue::Class(ty))
    }

    /// Destination local
    pub fn target(&self) -> LocalVariable {
        self.target
    }

    /// Loaded value
    pub fn value(&self) -> &ConstValue {
        &self.value
    }
}

/// Direction of a [`LoadStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStoreKind {
    /// Field read into the value local
    Load,
    /// Value local written to the field
    Store,
}

/// Field access
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStore {
    pub(crate) kind: LoadStoreKind,
    pub(crate) field: FieldId,
    pub(crate) value: LocalVariable,
    pub(crate) instance: Option<LocalVariable>,
}

impl LoadStore {
    /// Start building a field load
    pub fn load() -> LoadStoreBuilder {
        LoadStoreBuilder::new(LoadStoreKind::Load)
    }

    /// Start building a field store
    pub fn store() -> LoadStoreBuilder {
        LoadStoreBuilder::new(LoadStoreKind::Store)
    }

    /// Load or store
    pub fn kind(&self) -> LoadStoreKind {
        self.kind
    }

    /// Accessed field
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// Loaded or stored value
    pub fn value(&self) -> LocalVariable {
        self.value
    }

    /// Object holding the field; `None` for static fields
    pub fn instance(&self) -> Option<LocalVariable> {
        self.instance
    }
}

/// Condition of a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTest {
    /// Comparison
    pub condition: Condition,
    /// Left operand
    pub lhs: LocalVariable,
    /// Right operand; `None` compares against zero (or null)
    pub rhs: Option<LocalVariable>,
}

/// Jump within a body
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub(crate) test: Option<BranchTest>,
    pub(crate) target: InsnId,
}

impl Branch {
    /// Unconditional jump
    pub fn goto(target: InsnId) -> Self {
        Self { test: None, target }
    }

    /// Jump if `lhs <condition> rhs`
    pub fn compare(condition: Condition, lhs: LocalVariable, rhs: LocalVariable, target: InsnId) -> Self {
        Self {
            test: Some(BranchTest {
                condition,
                lhs,
                rhs: Some(rhs),
            }),
            target,
        }
    }

    /// Jump if `value <condition> 0`
    pub fn zero(condition: Condition, value: LocalVariable, target: InsnId) -> Self {
        Self {
            test: Some(BranchTest {
                condition,
                lhs: value,
                rhs: None,
            }),
            target,
        }
    }

    /// Condition; `None` for an unconditional jump
    pub fn test(&self) -> Option<&BranchTest> {
        self.test.as_ref()
    }

    /// Target instruction
    pub fn target(&self) -> InsnId {
        self.target
    }
}

/// One IR operation
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Method invocation
    Invoke(Invoke),
    /// Constant load
    Const(Const),
    /// Field access
    LoadStore(LoadStore),
    /// `target = source`
    Move {
        /// Destination
        target: LocalVariable,
        /// Source
        source: LocalVariable,
    },
    /// Return from the method, with a value unless void
    Return(Option<LocalVariable>),
    /// Jump
    Branch(Branch),
    /// `target = lhs <op> rhs`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Destination
        target: LocalVariable,
        /// Left operand
        lhs: LocalVariable,
        /// Right operand
        rhs: LocalVariable,
    },
    /// `target = new array_type[length]`
    NewArray {
        /// Destination
        target: LocalVariable,
        /// Element count
        length: LocalVariable,
        /// Array type
        array_type: TypeId,
    },
    /// `target = array.length`
    ArrayLength {
        /// Destination
        target: LocalVariable,
        /// Array
        array: LocalVariable,
    },
    /// `target = (ty) value`
    CheckCast {
        /// Destination
        target: LocalVariable,
        /// Checked value
        value: LocalVariable,
        /// Cast type
        ty: TypeId,
    },
    /// `target = value instanceof ty`
    InstanceOf {
        /// Destination
        target: LocalVariable,
        /// Tested value
        value: LocalVariable,
        /// Tested type
        ty: TypeId,
    },
    /// Throw the exception in the local
    Throw(LocalVariable),
}

impl Instruction {
    /// Symbols this instruction references, with the kind of each reference
    pub fn references(&self) -> Vec<(Symbol, ReferenceKind)> {
        match self {
            Instruction::Invoke(invoke) => match invoke.kind {
                InvokeKind::NewInstance => vec![
                    (Symbol::Type(invoke.owner), ReferenceKind::NewInstance),
                    (Symbol::Method(invoke.method), ReferenceKind::NewInstance),
                ],
                InvokeKind::Normal | InvokeKind::Special => {
                    vec![(Symbol::Method(invoke.method), ReferenceKind::Invoke)]
                }
            },
            Instruction::Const(Const {
                value: ConstValue::Class(ty),
                ..
            }) => vec![(Symbol::Type(*ty), ReferenceKind::ConstClass)],
            Instruction::LoadStore(access) => {
                let kind = match access.kind {
                    LoadStoreKind::Load => ReferenceKind::FieldLoad,
                    LoadStoreKind::Store => ReferenceKind::FieldStore,
                };
                vec![(Symbol::Field(access.field), kind)]
            }
            Instruction::NewArray { array_type, .. } => {
                vec![(Symbol::Type(*array_type), ReferenceKind::NewArray)]
            }
            Instruction::CheckCast { ty, .. } => vec![(Symbol::Type(*ty), ReferenceKind::CheckCast)],
            Instruction::InstanceOf { ty, .. } => {
                vec![(Symbol::Type(*ty), ReferenceKind::InstanceOf)]
            }
            _ => Vec::new(),
        }
    }

    /// Locals written by this instruction
    pub fn writes(&self) -> Vec<LocalVariable> {
        match self {
            Instruction::Invoke(invoke) => invoke.result.into_iter().collect(),
            Instruction::Const(c) => vec![c.target],
            Instruction::LoadStore(access) => match access.kind {
                LoadStoreKind::Load => vec![access.value],
                LoadStoreKind::Store => Vec::new(),
            },
            Instruction::Move { target, .. }
            | Instruction::Binary { target, .. }
            | Instruction::NewArray { target, .. }
            | Instruction::ArrayLength { target, .. }
            | Instruction::CheckCast { target, .. }
            | Instruction::InstanceOf { target, .. } => vec![*target],
            Instruction::Return(_) | Instruction::Branch(_) | Instruction::Throw(_) => Vec::new(),
        }
    }

    /// Locals read by this instruction, in operand order
    pub fn reads(&self) -> Vec<LocalVariable> {
        match self {
            Instruction::Invoke(invoke) => invoke.parameters.clone(),
            Instruction::Const(_) => Vec::new(),
            Instruction::LoadStore(access) => {
                let mut reads: Vec<_> = access.instance.into_iter().collect();
                if access.kind == LoadStoreKind::Store {
                    reads.insert(0, access.value);
                }
                reads
            }
            Instruction::Move { source, .. } => vec![*source],
            Instruction::Return(value) => value.iter().copied().collect(),
            Instruction::Branch(branch) => match &branch.test {
                Some(test) => std::iter::once(test.lhs).chain(test.rhs).collect(),
                None => Vec::new(),
            },
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::NewArray { length, .. } => vec![*length],
            Instruction::ArrayLength { array, .. } => vec![*array],
            Instruction::CheckCast { value, .. } | Instruction::InstanceOf { value, .. } => {
                vec![*value]
            }
            Instruction::Throw(value) => vec![*value],
        }
    }

    /// Every local operand: writes first, then reads
    pub fn locals(&self) -> Vec<LocalVariable> {
        let mut locals = self.writes();
        locals.extend(self.reads());
        locals
    }

    /// Branch target, if this is a branch
    pub fn branch_target(&self) -> Option<InsnId> {
        match self {
            Instruction::Branch(branch) => Some(branch.target),
            _ => None,
        }
    }

    /// Move a branch from one target to another
    pub(crate) fn retarget(&mut self, from: InsnId, to: InsnId) {
        if let Instruction::Branch(branch) = self {
            if branch.target == from {
                branch.target = to;
            }
        }
    }

    /// Member whose static marker decides this instruction's operand shape,
    /// with the shape it implies (`true` = static)
    pub(crate) fn member_shape(&self, arity: impl Fn(MethodId) -> usize) -> Option<(Symbol, bool)> {
        match self {
            Instruction::Invoke(invoke) => {
                let is_static = match invoke.kind {
                    InvokeKind::Normal => invoke.parameters.len() == arity(invoke.method),
                    InvokeKind::Special | InvokeKind::NewInstance => false,
                };
                Some((Symbol::Method(invoke.method), is_static))
            }
            Instruction::LoadStore(access) => {
                Some((Symbol::Field(access.field), access.instance.is_none()))
            }
            _ => None,
        }
    }
}

impl From<Invoke> for Instruction {
    fn from(invoke: Invoke) -> Self {
        Instruction::Invoke(invoke)
    }
}

impl From<Const> for Instruction {
    fn from(c: Const) -> Self {
        Instruction::Const(c)
    }
}

impl From<LoadStore> for Instruction {
    fn from(access: LoadStore) -> Self {
        Instruction::LoadStore(access)
    }
}

impl From<Branch> for Instruction {
    fn from(branch: Branch) -> Self {
        Instruction::Branch(branch)
    }
}
