//! Classpath: the session registry of every symbol
//!
//! Types, methods and fields are stored in arenas and deduplicated through
//! lookup tables, so resolving the same descriptor or member key twice
//! yields the same id. Nothing is ever removed.

use crate::code::{CodeBody, InsnId, Instruction, LocalVariable};
use crate::descriptor::{MethodSignature, TypeDescriptor};
use crate::error::{IrError, IrResult};
use crate::references::{ReferenceIndex, References, Symbol};
use crate::symbols::{
    FieldId, FieldMirror, LocalType, MethodId, MethodMirror, TriState, TypeDefinition, TypeId,
    TypeMirror, TypeVariant,
};
use dexir_image::access;
use rustc_hash::FxHashMap;

type MethodKey = (TypeId, String, MethodSignature);
type FieldKey = (TypeId, String, TypeDescriptor);

/// An attached instruction and the method whose body holds it
#[derive(Debug, Clone)]
pub(crate) struct InsnSlot {
    pub(crate) method: MethodId,
    pub(crate) instruction: Instruction,
}

/// Registry of all symbols, bodies and references of one session
#[derive(Debug, Clone, Default)]
pub struct Classpath {
    pub(crate) types: Vec<TypeMirror>,
    type_lookup: FxHashMap<TypeDescriptor, TypeId>,
    local_order: Vec<TypeId>,
    pub(crate) methods: Vec<MethodMirror>,
    method_lookup: FxHashMap<MethodKey, MethodId>,
    pub(crate) fields: Vec<FieldMirror>,
    field_lookup: FxHashMap<FieldKey, FieldId>,
    /// Instruction arena; `None` for detached or reserved ids
    pub(crate) code: Vec<Option<InsnSlot>>,
    /// Body each local was first attached in
    pub(crate) local_owners: FxHashMap<LocalVariable, MethodId>,
    pub(crate) index: ReferenceIndex,
}

impl Classpath {
    /// Create an empty classpath
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Types =====

    /// The unique mirror for a class or array type
    ///
    /// A first request creates an external mirror. Primitive and `void`
    /// descriptors fail with [`IrError::InvalidDescriptor`].
    pub fn type_mirror(&mut self, descriptor: &TypeDescriptor) -> IrResult<TypeId> {
        if !descriptor.is_reference() {
            return Err(IrError::InvalidDescriptor(format!(
                "{} is not a class or array type",
                descriptor
            )));
        }
        if let Some(&id) = self.type_lookup.get(descriptor) {
            return Ok(id);
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeMirror::external(descriptor.clone()));
        self.type_lookup.insert(descriptor.clone(), id);
        Ok(id)
    }

    /// Look up a type without creating it
    pub fn find_type(&self, descriptor: &TypeDescriptor) -> Option<TypeId> {
        self.type_lookup.get(descriptor).copied()
    }

    /// Mirror of a type
    ///
    /// # Panics
    ///
    /// Panics if the id was issued by another classpath.
    pub fn ty(&self, id: TypeId) -> &TypeMirror {
        &self.types[id.index()]
    }

    /// Every type, local and external, in creation order
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeMirror)> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(|(i, mirror)| (TypeId(i as u32), mirror))
    }

    /// Local types in definition order
    pub fn local_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.local_order.iter().copied()
    }

    /// Override whether a type is an interface
    ///
    /// External types take any value; a local type's kind is fixed by its
    /// access flags and a different value is a [`IrError::SignatureConflict`].
    pub fn set_interface(&mut self, ty: TypeId, interface: bool) -> IrResult<()> {
        let mirror = &mut self.types[ty.index()];
        match &mut mirror.variant {
            TypeVariant::External(external) => {
                external.interface = interface;
                Ok(())
            }
            TypeVariant::Local(local) => {
                if (local.access & access::INTERFACE != 0) == interface {
                    Ok(())
                } else {
                    Err(IrError::SignatureConflict(format!(
                        "{} is defined {} an interface",
                        mirror.descriptor,
                        if interface { "as not" } else { "as" }
                    )))
                }
            }
        }
    }

    /// Register a local type
    ///
    /// An existing external mirror is promoted in place, so ids handed out
    /// before stay valid. Defining a type twice fails with
    /// [`IrError::DuplicateType`].
    pub fn define_type(
        &mut self,
        descriptor: &TypeDescriptor,
        definition: TypeDefinition,
    ) -> IrResult<TypeId> {
        if !matches!(descriptor, TypeDescriptor::Object(_)) {
            return Err(IrError::InvalidDescriptor(format!(
                "{} cannot be defined",
                descriptor
            )));
        }
        let id = self.type_mirror(descriptor)?;
        let mirror = &mut self.types[id.index()];
        if mirror.is_local() {
            return Err(IrError::DuplicateType(descriptor.to_string()));
        }
        mirror.variant = TypeVariant::Local(LocalType {
            access: definition.access,
            superclass: definition.superclass,
            interfaces: definition.interfaces,
            source_file: definition.source_file,
            methods: Vec::new(),
            fields: Vec::new(),
        });
        self.local_order.push(id);
        Ok(id)
    }

    // ===== Members =====

    /// Resolve or create a method of `owner`
    ///
    /// `is_static` is a hint: `Unknown` never changes an existing marker, a
    /// known hint refines an unknown marker, and a known hint contradicting
    /// a known marker fails with [`IrError::SignatureConflict`].
    pub fn method(
        &mut self,
        owner: TypeId,
        name: &str,
        signature: &MethodSignature,
        is_static: TriState,
    ) -> IrResult<MethodId> {
        let key = (owner, name.to_string(), signature.clone());
        if let Some(&id) = self.method_lookup.get(&key) {
            self.refine(Symbol::Method(id), is_static)?;
            return Ok(id);
        }
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodMirror {
            owner,
            name: name.to_string(),
            signature: signature.clone(),
            is_static,
            declaration: None,
            body: None,
        });
        self.method_lookup.insert(key, id);
        Ok(id)
    }

    /// Resolve or create a field of `owner`; see [`Classpath::method`] for `is_static`
    pub fn field(
        &mut self,
        owner: TypeId,
        name: &str,
        ty: &TypeDescriptor,
        is_static: TriState,
    ) -> IrResult<FieldId> {
        if ty.is_void() {
            return Err(IrError::InvalidDescriptor(format!("field {} of type V", name)));
        }
        let key = (owner, name.to_string(), ty.clone());
        if let Some(&id) = self.field_lookup.get(&key) {
            self.refine(Symbol::Field(id), is_static)?;
            return Ok(id);
        }
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldMirror {
            owner,
            name: name.to_string(),
            ty: ty.clone(),
            is_static,
            declaration: None,
        });
        self.field_lookup.insert(key, id);
        Ok(id)
    }

    /// Look up a method without creating it
    pub fn find_method(
        &self,
        owner: TypeId,
        name: &str,
        signature: &MethodSignature,
    ) -> Option<MethodId> {
        self.method_lookup
            .get(&(owner, name.to_string(), signature.clone()))
            .copied()
    }

    /// Look up a field without creating it
    pub fn find_field(&self, owner: TypeId, name: &str, ty: &TypeDescriptor) -> Option<FieldId> {
        self.field_lookup
            .get(&(owner, name.to_string(), ty.clone()))
            .copied()
    }

    /// Mirror of a method
    ///
    /// # Panics
    ///
    /// Panics if the id was issued by another classpath.
    pub fn method_mirror(&self, id: MethodId) -> &MethodMirror {
        &self.methods[id.index()]
    }

    /// Mirror of a field
    ///
    /// # Panics
    ///
    /// Panics if the id was issued by another classpath.
    pub fn field_mirror(&self, id: FieldId) -> &FieldMirror {
        &self.fields[id.index()]
    }

    /// `Lowner;->name(params)ret`
    pub fn method_descriptor(&self, id: MethodId) -> String {
        let method = self.method_mirror(id);
        format!(
            "{}->{}{}",
            self.ty(method.owner).descriptor(),
            method.name,
            method.signature
        )
    }

    /// `Lowner;->name:type`
    pub fn field_descriptor(&self, id: FieldId) -> String {
        let field = self.field_mirror(id);
        format!(
            "{}->{}:{}",
            self.ty(field.owner).descriptor(),
            field.name,
            field.ty
        )
    }

    /// Declare a method on a local type
    ///
    /// The static marker comes from the `STATIC` access flag.
    pub fn declare_method(
        &mut self,
        owner: TypeId,
        name: &str,
        signature: &MethodSignature,
        access_flags: u32,
    ) -> IrResult<MethodId> {
        self.require_local(owner)?;
        let is_static = TriState::from_bool(access_flags & access::STATIC != 0);
        let id = self.method(owner, name, signature, is_static)?;
        if self.methods[id.index()].declaration.is_some() {
            return Err(IrError::DuplicateMember(self.method_descriptor(id)));
        }
        self.methods[id.index()].declaration = Some(access_flags);
        if let Some(local) = self.types[owner.index()].as_local_mut() {
            local.methods.push(id);
        }
        Ok(id)
    }

    /// Declare a field on a local type
    pub fn declare_field(
        &mut self,
        owner: TypeId,
        name: &str,
        ty: &TypeDescriptor,
        access_flags: u32,
    ) -> IrResult<FieldId> {
        self.require_local(owner)?;
        let is_static = TriState::from_bool(access_flags & access::STATIC != 0);
        let id = self.field(owner, name, ty, is_static)?;
        if self.fields[id.index()].declaration.is_some() {
            return Err(IrError::DuplicateMember(self.field_descriptor(id)));
        }
        self.fields[id.index()].declaration = Some(access_flags);
        if let Some(local) = self.types[owner.index()].as_local_mut() {
            local.fields.push(id);
        }
        Ok(id)
    }

    fn require_local(&self, owner: TypeId) -> IrResult<()> {
        if self.ty(owner).is_local() {
            Ok(())
        } else {
            Err(IrError::NotLocal(self.ty(owner).descriptor().to_string()))
        }
    }

    /// Give a declared, concrete method an empty body
    ///
    /// Parameter locals are derived from the signature, receiver first for
    /// instance methods, and are returned in that order.
    pub fn create_body(&mut self, method: MethodId) -> IrResult<Vec<LocalVariable>> {
        let mirror = &self.methods[method.index()];
        let access_flags = mirror
            .declaration
            .ok_or_else(|| IrError::NotLocal(self.method_descriptor(method)))?;
        if access_flags & (access::ABSTRACT | access::NATIVE) != 0 {
            return Err(IrError::SignatureConflict(format!(
                "{} is abstract or native and cannot have code",
                self.method_descriptor(method)
            )));
        }
        if mirror.body.is_some() {
            return Err(IrError::DuplicateMember(format!(
                "code of {}",
                self.method_descriptor(method)
            )));
        }

        let mut parameters = Vec::with_capacity(mirror.signature.arity() + 1);
        if access_flags & access::STATIC == 0 {
            parameters.push(LocalVariable::reference());
        }
        parameters.extend(
            mirror
                .signature
                .parameters
                .iter()
                .filter_map(|p| p.value_kind())
                .map(LocalVariable::new),
        );

        for &param in &parameters {
            self.local_owners.insert(param, method);
        }
        self.methods[method.index()].body = Some(CodeBody {
            parameters: parameters.clone(),
            locals: parameters.clone(),
            instructions: Vec::new(),
        });
        Ok(parameters)
    }

    /// Code body of a method
    pub fn body(&self, method: MethodId) -> Option<&CodeBody> {
        self.method_mirror(method).body()
    }

    /// An attached instruction
    pub fn instruction(&self, id: InsnId) -> Option<&Instruction> {
        self.slot(id).map(|slot| &slot.instruction)
    }

    /// Method whose body holds an attached instruction
    pub fn method_of(&self, id: InsnId) -> Option<MethodId> {
        self.slot(id).map(|slot| slot.method)
    }

    pub(crate) fn slot(&self, id: InsnId) -> Option<&InsnSlot> {
        self.code.get(id.index()).and_then(|slot| slot.as_ref())
    }

    // ===== References =====

    /// References to a symbol
    pub fn references(&self, symbol: impl Into<Symbol>) -> References<'_> {
        References::new(self, symbol.into())
    }

    // ===== Static markers =====

    /// Apply a static hint to an existing member
    fn refine(&mut self, symbol: Symbol, hint: TriState) -> IrResult<()> {
        let current = match symbol {
            Symbol::Method(id) => self.methods[id.index()].is_static,
            Symbol::Field(id) => self.fields[id.index()].is_static,
            Symbol::Type(_) => return Ok(()),
        };
        match (current, hint) {
            (_, TriState::Unknown) => Ok(()),
            (TriState::Unknown, known) => {
                self.check_uses(symbol, known)?;
                match symbol {
                    Symbol::Method(id) => self.methods[id.index()].is_static = known,
                    Symbol::Field(id) => self.fields[id.index()].is_static = known,
                    Symbol::Type(_) => {}
                }
                Ok(())
            }
            (current, known) if current == known => Ok(()),
            (current, known) => Err(IrError::SignatureConflict(format!(
                "{} is {}, requested as {}",
                self.symbol_name(symbol),
                static_word(current),
                static_word(known)
            ))),
        }
    }

    /// Check that every attached use of a member fits a static marker
    fn check_uses(&self, symbol: Symbol, marker: TriState) -> IrResult<()> {
        let Some(is_static) = marker.as_bool() else {
            return Ok(());
        };
        for reference in self.references(symbol).list_all() {
            if let Some(instruction) = self.instruction(reference.instruction()) {
                self.check_shape(instruction, Some((symbol, is_static)))?;
            }
        }
        Ok(())
    }

    /// Check an instruction's operand shape against its member's marker
    ///
    /// With `assume`, the given marker replaces the member's current one.
    pub(crate) fn check_shape(
        &self,
        instruction: &Instruction,
        assume: Option<(Symbol, bool)>,
    ) -> IrResult<()> {
        let arity = |method: MethodId| self.method_mirror(method).signature.arity();
        let Some((symbol, shape_static)) = instruction.member_shape(arity) else {
            return Ok(());
        };
        let marker = match assume {
            Some((assumed, value)) if assumed == symbol => Some(value),
            _ => match symbol {
                Symbol::Method(id) => self.method_mirror(id).is_static.as_bool(),
                Symbol::Field(id) => self.field_mirror(id).is_static.as_bool(),
                Symbol::Type(_) => None,
            },
        };
        match marker {
            Some(marker) if marker != shape_static => Err(IrError::SignatureConflict(format!(
                "{} is {} but is used as {}",
                self.symbol_name(symbol),
                static_word(TriState::from_bool(marker)),
                static_word(TriState::from_bool(shape_static))
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn symbol_name(&self, symbol: Symbol) -> String {
        match symbol {
            Symbol::Type(id) => self.ty(id).descriptor().to_string(),
            Symbol::Method(id) => self.method_descriptor(id),
            Symbol::Field(id) => self.field_descriptor(id),
        }
    }
}

fn static_word(marker: TriState) -> &'static str {
    match marker {
        TriState::True => "static",
        TriState::False => "an instance member",
        TriState::Unknown => "unknown",
    }
}
