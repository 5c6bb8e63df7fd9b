//! Builders for instructions that must agree with their target's signature

use super::instruction::{Invoke, InvokeKind, LoadStore, LoadStoreKind};
use super::local::LocalVariable;
use crate::classpath::Classpath;
use crate::descriptor::ValueKind;
use crate::error::{IrError, IrResult};
use crate::symbols::{FieldId, MethodId, TriState};

/// Builder for [`Invoke`]
#[derive(Debug, Clone)]
pub struct InvokeBuilder {
    kind: InvokeKind,
    method: Option<MethodId>,
    parameters: Vec<LocalVariable>,
    result: Option<LocalVariable>,
}

impl InvokeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            kind: InvokeKind::Normal,
            method: None,
            parameters: Vec::new(),
            result: None,
        }
    }

    /// Allocate a new instance and run the target constructor on it
    pub fn new_instance(mut self) -> Self {
        self.kind = InvokeKind::NewInstance;
        self
    }

    /// Non-virtual call
    pub fn special(mut self) -> Self {
        self.kind = InvokeKind::Special;
        self
    }

    /// Target method
    pub fn method(mut self, method: MethodId) -> Self {
        self.method = Some(method);
        self
    }

    /// Append an argument (the receiver comes first for instance targets)
    pub fn parameter(mut self, value: LocalVariable) -> Self {
        self.parameters.push(value);
        self
    }

    /// Append several arguments
    pub fn parameters(mut self, values: impl IntoIterator<Item = LocalVariable>) -> Self {
        self.parameters.extend(values);
        self
    }

    /// Bind the result (the fresh instance for new-instance invokes)
    pub fn return_value(mut self, value: LocalVariable) -> Self {
        self.result = Some(value);
        self
    }

    /// Check operands against the target and build the invoke
    pub fn build(self, classpath: &Classpath) -> IrResult<Invoke> {
        let method = self
            .method
            .ok_or_else(|| IrError::UnresolvedSymbol("invoke without target method".into()))?;
        let mirror = classpath.method_mirror(method);
        let name = classpath.method_descriptor(method);
        let signature = mirror.signature();

        // Which receiver shapes are acceptable: (static, instance)
        let (accept_static, accept_instance) = match self.kind {
            InvokeKind::NewInstance => {
                if !mirror.is_constructor() || !signature.return_type.is_void() {
                    return Err(IrError::NotAConstructor(name));
                }
                (true, false)
            }
            InvokeKind::Special => (false, true),
            InvokeKind::Normal => match mirror.is_static() {
                TriState::True => (true, false),
                TriState::False => (false, true),
                TriState::Unknown => (true, true),
            },
        };
        if self.kind != InvokeKind::Normal && mirror.is_static() == TriState::True {
            return Err(IrError::SignatureConflict(format!(
                "{} is static and cannot be invoked non-virtually",
                name
            )));
        }

        let arity = signature.arity();
        let shape_static = self.parameters.len() == arity && accept_static;
        let shape_instance = self.parameters.len() == arity + 1 && accept_instance;
        if !shape_static && !shape_instance {
            let expected = if accept_static { arity } else { arity + 1 };
            return Err(IrError::ArityMismatch(format!(
                "{} expects {} operands, got {}",
                name,
                expected,
                self.parameters.len()
            )));
        }

        let mut expected = Vec::with_capacity(self.parameters.len());
        if shape_instance {
            expected.push(ValueKind::Reference);
        }
        expected.extend(signature.parameters.iter().filter_map(|p| p.value_kind()));
        for (position, (param, kind)) in self.parameters.iter().zip(&expected).enumerate() {
            if !param.kind().is_assignable_to(*kind) {
                return Err(IrError::ArityMismatch(format!(
                    "{} operand {} is {}, expected {}",
                    name,
                    position,
                    param.kind(),
                    kind
                )));
            }
        }

        let result_kind = match self.kind {
            InvokeKind::NewInstance => Some(ValueKind::Reference),
            _ => signature.return_type.value_kind(),
        };
        match (result_kind, self.result) {
            (None, Some(_)) => {
                return Err(IrError::SignatureConflict(format!(
                    "{} returns void but a result is bound",
                    name
                )))
            }
            (Some(_), None) => {
                return Err(IrError::SignatureConflict(format!(
                    "{} produces a value but no result is bound",
                    name
                )))
            }
            (Some(kind), Some(result)) if !result.kind().is_assignable_to(kind) => {
                return Err(IrError::SignatureConflict(format!(
                    "{} produces {}, result local is {}",
                    name,
                    kind,
                    result.kind()
                )))
            }
            _ => {}
        }

        Ok(Invoke {
            kind: self.kind,
            method,
            owner: mirror.owner(),
            parameters: self.parameters,
            result: self.result,
        })
    }
}

/// Builder for [`LoadStore`]
#[derive(Debug, Clone)]
pub struct LoadStoreBuilder {
    kind: LoadStoreKind,
    field: Option<FieldId>,
    value: Option<LocalVariable>,
    instance: Option<LocalVariable>,
}

impl LoadStoreBuilder {
    pub(crate) fn new(kind: LoadStoreKind) -> Self {
        Self {
            kind,
            field: None,
            value: None,
            instance: None,
        }
    }

    /// Accessed field
    pub fn field(mut self, field: FieldId) -> Self {
        self.field = Some(field);
        self
    }

    /// Loaded or stored value
    pub fn value(mut self, value: LocalVariable) -> Self {
        self.value = Some(value);
        self
    }

    /// Object holding an instance field
    pub fn instance(mut self, instance: LocalVariable) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Check operands against the field and build the access
    pub fn build(self, classpath: &Classpath) -> IrResult<LoadStore> {
        let field = self
            .field
            .ok_or_else(|| IrError::UnresolvedSymbol("field access without target field".into()))?;
        let mirror = classpath.field_mirror(field);
        let name = classpath.field_descriptor(field);

        let value = self
            .value
            .ok_or_else(|| IrError::ArityMismatch(format!("{} access without value", name)))?;

        match (mirror.is_static(), self.instance) {
            (TriState::True, Some(_)) => {
                return Err(IrError::ArityMismatch(format!(
                    "{} is static but an instance was given",
                    name
                )))
            }
            (TriState::False, None) => {
                return Err(IrError::ArityMismatch(format!(
                    "{} is an instance field but no instance was given",
                    name
                )))
            }
            (_, Some(instance)) if instance.kind() != ValueKind::Reference => {
                return Err(IrError::ArityMismatch(format!(
                    "{} instance operand is {}",
                    name,
                    instance.kind()
                )))
            }
            _ => {}
        }

        if let Some(kind) = mirror.ty().value_kind() {
            if !value.kind().is_assignable_to(kind) {
                return Err(IrError::SignatureConflict(format!(
                    "{} holds {}, value local is {}",
                    name,
                    kind,
                    value.kind()
                )));
            }
        }

        Ok(LoadStore {
            kind: self.kind,
            field,
            value,
            instance: self.instance,
        })
    }
}
