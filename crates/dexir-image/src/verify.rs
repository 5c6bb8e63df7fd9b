//! Structural image verification
//!
//! Checks that every index in an image resolves and that code items are
//! well formed. Says nothing about types flowing through registers.

use crate::constants::ConstantPool;
use crate::image::{register_kind, ClassDef, CodeItem, Image};
use crate::insn::{Insn, InvokeType, PoolRef};
use crate::opcode::Opcode;

/// Image verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Invalid constant pool reference
    #[error("Invalid {kind} reference: index {index} (pool size {size})")]
    InvalidConstantRef {
        /// Pool table name
        kind: &'static str,
        /// Offending index
        index: u32,
        /// Table size
        size: usize,
    },

    /// Register out of range
    #[error("Invalid register v{register} (registers: {max}) in {method} at {offset}")]
    InvalidRegister {
        /// Offending register
        register: u16,
        /// Register count of the code item
        max: u16,
        /// Method descriptor
        method: String,
        /// Instruction index
        offset: usize,
    },

    /// Branch to an invalid instruction
    #[error("Invalid branch target {target} in {method} at {offset}")]
    InvalidBranchTarget {
        /// Target instruction index
        target: u32,
        /// Method descriptor
        method: String,
        /// Instruction index of the branch
        offset: usize,
    },

    /// Instruction pairing violated
    #[error("Malformed code in {method} at {offset}: {reason}")]
    MalformedCode {
        /// Method descriptor
        method: String,
        /// Instruction index
        offset: usize,
        /// What is wrong
        reason: &'static str,
    },

    /// Class table inconsistency
    #[error("Class validation error: {0}")]
    ClassValidation(String),
}

/// Verify an image
pub fn verify_image(image: &Image) -> Result<(), VerifyError> {
    verify_constants(&image.constants)?;

    for class in &image.classes {
        verify_class(class, &image.constants)?;
    }

    Ok(())
}

fn check_index(kind: &'static str, index: u32, size: usize) -> Result<(), VerifyError> {
    if (index as usize) < size {
        Ok(())
    } else {
        Err(VerifyError::InvalidConstantRef { kind, index, size })
    }
}

fn verify_constants(pool: &ConstantPool) -> Result<(), VerifyError> {
    let strings = pool.strings.len();
    let types = pool.types.len();

    for &ty in &pool.types {
        check_index("string", ty, strings)?;
    }
    for proto in &pool.protos {
        check_index("type", proto.return_type, types)?;
        for &param in &proto.parameters {
            check_index("type", param, types)?;
        }
    }
    for field in &pool.fields {
        check_index("type", field.class, types)?;
        check_index("type", field.ty, types)?;
        check_index("string", field.name, strings)?;
    }
    for method in &pool.methods {
        check_index("type", method.class, types)?;
        check_index("proto", method.proto, pool.protos.len())?;
        check_index("string", method.name, strings)?;
    }
    Ok(())
}

fn verify_class(class: &ClassDef, pool: &ConstantPool) -> Result<(), VerifyError> {
    let types = pool.types.len();
    check_index("type", class.class, types)?;
    if let Some(superclass) = class.superclass {
        check_index("type", superclass, types)?;
    }
    for &interface in &class.interfaces {
        check_index("type", interface, types)?;
    }
    if let Some(source_file) = class.source_file {
        check_index("string", source_file, pool.strings.len())?;
    }

    for field in &class.fields {
        check_index("field", field.field, pool.fields.len())?;
        if pool.fields[field.field as usize].class != class.class {
            return Err(VerifyError::ClassValidation(format!(
                "field {} declared outside its owner",
                field.field
            )));
        }
    }

    for method in &class.methods {
        check_index("method", method.method, pool.methods.len())?;
        if pool.methods[method.method as usize].class != class.class {
            return Err(VerifyError::ClassValidation(format!(
                "method {} declared outside its owner",
                method.method
            )));
        }
        if let Some(code) = &method.code {
            let name = method_name(pool, method.method);
            verify_code(code, pool, &name)?;
        }
    }

    Ok(())
}

fn method_name(pool: &ConstantPool, method: u32) -> String {
    pool.get_method(method)
        .and_then(|m| {
            let class = pool.get_type(m.class)?;
            let name = pool.get_string(m.name)?;
            let proto = pool.proto_descriptor(m.proto)?;
            Some(format!("{}->{}{}", class, name, proto))
        })
        .unwrap_or_else(|| format!("method#{}", method))
}

/// Verify a single code item
fn verify_code(code: &CodeItem, pool: &ConstantPool, method: &str) -> Result<(), VerifyError> {
    let malformed = |offset: usize, reason: &'static str| VerifyError::MalformedCode {
        method: method.to_string(),
        offset,
        reason,
    };

    if code.register_kinds.len() != code.registers_size as usize {
        return Err(malformed(0, "register kind table size mismatch"));
    }
    if code.ins_size > code.registers_size {
        return Err(malformed(0, "more parameter registers than registers"));
    }
    for (register, &kind) in code.register_kinds.iter().enumerate() {
        if !register_kind::is_valid(kind) {
            return Err(malformed(0, "unknown register kind"));
        }
        if register_kind::is_wide(kind)
            && code.register_kinds.get(register + 1) != Some(&register_kind::WIDE_HIGH)
        {
            return Err(malformed(0, "wide register without its high half"));
        }
    }

    let count = code.insns.len();
    for (offset, insn) in code.insns.iter().enumerate() {
        for register in insn.registers() {
            if register >= code.registers_size {
                return Err(VerifyError::InvalidRegister {
                    register,
                    max: code.registers_size,
                    method: method.to_string(),
                    offset,
                });
            }
        }

        match insn.pool_ref() {
            Some(PoolRef::String(index)) => check_index("string", index, pool.strings.len())?,
            Some(PoolRef::Type(index)) => check_index("type", index, pool.types.len())?,
            Some(PoolRef::Field(index)) => check_index("field", index, pool.fields.len())?,
            Some(PoolRef::Method(index)) => check_index("method", index, pool.methods.len())?,
            None => {}
        }

        if let Some(target) = insn.branch_target() {
            let valid = (target as usize) < count && is_instruction_start(code, target as usize);
            if !valid {
                return Err(VerifyError::InvalidBranchTarget {
                    target,
                    method: method.to_string(),
                    offset,
                });
            }
        }

        let previous = offset.checked_sub(1).map(|i| &code.insns[i]);
        match insn {
            Insn::MoveResult { .. } => {
                if !previous.is_some_and(|p| p.opcode().is_invoke()) {
                    return Err(malformed(offset, "move-result without preceding invoke"));
                }
            }
            Insn::NewInstance { dst, .. } => match code.insns.get(offset + 1) {
                Some(Insn::Invoke {
                    kind: InvokeType::Direct,
                    method: ctor,
                    args,
                }) if args.first() == Some(dst) && is_constructor(pool, *ctor) => {}
                _ => {
                    return Err(malformed(
                        offset,
                        "new-instance not followed by its constructor call",
                    ))
                }
            },
            _ => {}
        }
    }

    if code.insns.last().is_some_and(|last| !last.opcode().is_terminator()) {
        return Err(malformed(count - 1, "execution falls off the end of the code"));
    }

    Ok(())
}

/// Instructions fused with their predecessor cannot be branched to
fn is_instruction_start(code: &CodeItem, index: usize) -> bool {
    match &code.insns[index] {
        Insn::MoveResult { .. } => false,
        Insn::Invoke {
            kind: InvokeType::Direct,
            ..
        } => !matches!(
            index.checked_sub(1).map(|i| code.insns[i].opcode()),
            Some(Opcode::NewInstance)
        ),
        _ => true,
    }
}

fn is_constructor(pool: &ConstantPool, method: u32) -> bool {
    pool.get_method(method)
        .and_then(|m| pool.get_string(m.name))
        .is_some_and(|name| name == "<init>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ConstantPoolBuilder;
    use crate::image::{access, MethodDef};
    use crate::insn::Condition;

    fn image_with_code(build: impl FnOnce(&mut ConstantPoolBuilder) -> CodeItem) -> Image {
        let mut pool = ConstantPoolBuilder::new();
        let class = pool.ty("LTest;");
        let method = pool.method("LTest;", "run", "V", &[]);
        let code = build(&mut pool);
        let mut image = Image::new();
        image.constants = pool.build();
        image.classes.push(ClassDef {
            class,
            access: access::PUBLIC,
            superclass: None,
            interfaces: vec![],
            source_file: None,
            fields: vec![],
            methods: vec![MethodDef {
                method,
                access: access::PUBLIC | access::STATIC,
                code: Some(code),
            }],
        });
        image
    }

    fn code(registers: u16, insns: Vec<Insn>) -> CodeItem {
        CodeItem {
            registers_size: registers,
            ins_size: 0,
            register_kinds: vec![register_kind::REFERENCE; registers as usize],
            insns,
        }
    }

    #[test]
    fn test_verify_empty_image() {
        assert!(verify_image(&Image::new()).is_ok());
    }

    #[test]
    fn test_verify_simple_method() {
        let image = image_with_code(|pool| {
            let ctor = pool.method("Ljava/lang/Object;", "<init>", "V", &[]);
            let object = pool.ty("Ljava/lang/Object;");
            code(
                1,
                vec![
                    Insn::NewInstance { dst: 0, ty: object },
                    Insn::Invoke {
                        kind: InvokeType::Direct,
                        method: ctor,
                        args: vec![0],
                    },
                    Insn::ReturnVoid,
                ],
            )
        });
        assert!(verify_image(&image).is_ok());
    }

    #[test]
    fn test_verify_register_out_of_range() {
        let image = image_with_code(|_| code(1, vec![Insn::ConstNull { dst: 3 }, Insn::ReturnVoid]));
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::InvalidRegister { register: 3, .. })
        ));
    }

    #[test]
    fn test_verify_invalid_string_ref() {
        let image = image_with_code(|_| {
            code(1, vec![Insn::ConstString { dst: 0, string: 99 }, Insn::ReturnVoid])
        });
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::InvalidConstantRef { kind: "string", index: 99, .. })
        ));
    }

    #[test]
    fn test_verify_invalid_branch_target() {
        let image = image_with_code(|_| {
            code(
                1,
                vec![
                    Insn::IfZero {
                        cond: Condition::Eq,
                        a: 0,
                        target: 7,
                    },
                    Insn::ReturnVoid,
                ],
            )
        });
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::InvalidBranchTarget { target: 7, .. })
        ));
    }

    #[test]
    fn test_verify_branch_into_fused_pair() {
        let image = image_with_code(|pool| {
            let method = pool.method("LTest;", "value", "I", &[]);
            code(
                1,
                vec![
                    Insn::Invoke {
                        kind: InvokeType::Static,
                        method,
                        args: vec![],
                    },
                    Insn::MoveResult { dst: 0 },
                    Insn::Goto { target: 1 },
                ],
            )
        });
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::InvalidBranchTarget { target: 1, .. })
        ));
    }

    #[test]
    fn test_verify_orphan_move_result() {
        let image = image_with_code(|_| code(1, vec![Insn::MoveResult { dst: 0 }, Insn::ReturnVoid]));
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::MalformedCode { offset: 0, .. })
        ));
    }

    #[test]
    fn test_verify_new_instance_without_constructor() {
        let image = image_with_code(|pool| {
            let object = pool.ty("Ljava/lang/Object;");
            code(1, vec![Insn::NewInstance { dst: 0, ty: object }, Insn::ReturnVoid])
        });
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::MalformedCode { offset: 0, .. })
        ));
    }

    #[test]
    fn test_verify_falls_off_end() {
        let image = image_with_code(|_| code(1, vec![Insn::ConstNull { dst: 0 }]));
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::MalformedCode { offset: 0, .. })
        ));
    }

    #[test]
    fn test_verify_wide_register_pair() {
        let image = image_with_code(|_| CodeItem {
            registers_size: 2,
            ins_size: 0,
            register_kinds: vec![register_kind::LONG, register_kind::INT],
            insns: vec![Insn::ReturnVoid],
        });
        assert!(matches!(
            verify_image(&image),
            Err(VerifyError::MalformedCode { .. })
        ));
    }
}
