//! Reference index
//!
//! For every symbol, the instructions currently attached to some body that
//! reference it, in attach order. The index is written only by the
//! attach/detach primitive in [`crate::code`].

use crate::classpath::Classpath;
use crate::code::InsnId;
use crate::error::{IrError, IrResult};
use crate::symbols::{FieldId, MethodId, TypeId};
use rustc_hash::FxHashMap;

/// A referenceable symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A type
    Type(TypeId),
    /// A method
    Method(MethodId),
    /// A field
    Field(FieldId),
}

impl From<TypeId> for Symbol {
    fn from(id: TypeId) -> Self {
        Symbol::Type(id)
    }
}

impl From<MethodId> for Symbol {
    fn from(id: MethodId) -> Self {
        Symbol::Method(id)
    }
}

impl From<FieldId> for Symbol {
    fn from(id: FieldId) -> Self {
        Symbol::Field(id)
    }
}

/// How an instruction uses a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Method call (normal or special)
    Invoke,
    /// Allocation: the constructor and its owner type
    NewInstance,
    /// Field read
    FieldLoad,
    /// Field write
    FieldStore,
    /// Checked cast target
    CheckCast,
    /// Instance test target
    InstanceOf,
    /// Class literal
    ConstClass,
    /// Array allocation type
    NewArray,
}

/// One use of a symbol by an attached instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    symbol: Symbol,
    kind: ReferenceKind,
    instruction: InsnId,
}

impl Reference {
    /// Referenced symbol
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Kind of use
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Referencing instruction
    pub fn instruction(&self) -> InsnId {
        self.instruction
    }
}

#[derive(Debug, Clone, Default)]
struct SymbolReferences {
    references: Vec<Reference>,
    modifications: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceIndex {
    symbols: FxHashMap<Symbol, SymbolReferences>,
}

impl ReferenceIndex {
    pub(crate) fn add(&mut self, symbol: Symbol, kind: ReferenceKind, instruction: InsnId) {
        let entry = self.symbols.entry(symbol).or_default();
        entry.references.push(Reference {
            symbol,
            kind,
            instruction,
        });
        entry.modifications += 1;
    }

    pub(crate) fn remove(&mut self, symbol: Symbol, instruction: InsnId) {
        if let Some(entry) = self.symbols.get_mut(&symbol) {
            entry.references.retain(|r| r.instruction != instruction);
            entry.modifications += 1;
        }
    }

    fn references(&self, symbol: Symbol) -> &[Reference] {
        self.symbols
            .get(&symbol)
            .map(|entry| entry.references.as_slice())
            .unwrap_or(&[])
    }

    fn modifications(&self, symbol: Symbol) -> u64 {
        self.symbols.get(&symbol).map_or(0, |entry| entry.modifications)
    }
}

/// Borrowing view of one symbol's references
///
/// The borrow of the classpath rules out edits while the view is alive; use
/// [`References::cursor`] to interleave iteration with edits.
#[derive(Debug, Clone, Copy)]
pub struct References<'a> {
    classpath: &'a Classpath,
    symbol: Symbol,
}

impl<'a> References<'a> {
    pub(crate) fn new(classpath: &'a Classpath, symbol: Symbol) -> Self {
        Self { classpath, symbol }
    }

    fn slice(&self) -> &'a [Reference] {
        self.classpath.index.references(self.symbol)
    }

    /// References of one kind, in attach order
    pub fn list_references(&self, kind: ReferenceKind) -> impl Iterator<Item = Reference> + 'a {
        self.slice().iter().copied().filter(move |r| r.kind == kind)
    }

    /// All references, in attach order
    pub fn list_all(&self) -> impl Iterator<Item = Reference> + 'a {
        self.slice().iter().copied()
    }

    /// Number of references of one kind
    pub fn count(&self, kind: ReferenceKind) -> usize {
        self.list_references(kind).count()
    }

    /// Number of references
    pub fn len(&self) -> usize {
        self.slice().len()
    }

    /// Check if nothing references the symbol
    pub fn is_empty(&self) -> bool {
        self.slice().is_empty()
    }

    /// Non-borrowing, fail-fast cursor over references of one kind
    pub fn cursor(&self, kind: ReferenceKind) -> ReferenceCursor {
        ReferenceCursor {
            symbol: self.symbol,
            kind: Some(kind),
            position: 0,
            modifications: self.classpath.index.modifications(self.symbol),
        }
    }

    /// Non-borrowing, fail-fast cursor over all references
    pub fn cursor_all(&self) -> ReferenceCursor {
        ReferenceCursor {
            symbol: self.symbol,
            kind: None,
            position: 0,
            modifications: self.classpath.index.modifications(self.symbol),
        }
    }
}

/// Cursor that walks a symbol's references while the classpath is edited
///
/// Edits that do not touch the walked symbol are fine; any change to its
/// reference set makes the next step fail with
/// [`IrError::ConcurrentModification`].
#[derive(Debug, Clone)]
pub struct ReferenceCursor {
    symbol: Symbol,
    kind: Option<ReferenceKind>,
    position: usize,
    modifications: u64,
}

impl ReferenceCursor {
    /// Advance to the next matching reference
    pub fn next(&mut self, classpath: &Classpath) -> IrResult<Option<Reference>> {
        if classpath.index.modifications(self.symbol) != self.modifications {
            return Err(IrError::ConcurrentModification(self.symbol));
        }
        let references = classpath.index.references(self.symbol);
        while let Some(reference) = references.get(self.position) {
            self.position += 1;
            if self.kind.map_or(true, |kind| kind == reference.kind) {
                return Ok(Some(*reference));
            }
        }
        Ok(None)
    }

    /// Symbol being walked
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }
}
