//! Image encoding
//!
//! Lowers every local type of a [`Classpath`] back into an [`Image`].
//! External types are referenced but never emitted.

use crate::alloc::RegisterMap;
use crate::classpath::Classpath;
use crate::code::{
    CodeBody, ConstValue, InsnId, Instruction, Invoke, InvokeKind, LoadStore, LoadStoreKind,
    LocalVariable,
};
use crate::config::CodecConfig;
use crate::error::{IrError, IrResult};
use crate::symbols::{FieldId, MethodId, TriState, TypeId};
use dexir_image::{
    flags, verify_image, ClassDef, CodeItem, ConstantPool, ConstantPoolBuilder, FieldDef, Image,
    Insn, InvokeType, MethodDef,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Encodes classpaths with a fixed set of limits
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: CodecConfig,
}

impl Encoder {
    /// Create an encoder
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Limits in use
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a classpath into image bytes
    pub fn encode(&self, classpath: &Classpath) -> IrResult<Vec<u8>> {
        Ok(self.build_image(classpath)?.encode())
    }

    /// Lower a classpath into an image without serializing it
    pub fn build_image(&self, classpath: &Classpath) -> IrResult<Image> {
        let mut pool = ConstantPoolBuilder::new();
        let mut classes = Vec::new();
        for ty in classpath.local_types() {
            classes.push(self.encode_class(classpath, &mut pool, ty)?);
        }
        let constants = pool.build();
        self.check_pool(&constants)?;

        let has_sources = classes.iter().any(|class| class.source_file.is_some());
        let image = Image {
            flags: if has_sources { flags::HAS_SOURCE_FILES } else { 0 },
            constants,
            classes,
        };
        // Never hand out bytes the decoder would refuse
        verify_image(&image).map_err(|err| IrError::InvalidBody(err.to_string()))?;
        debug!(
            classes = image.classes.len(),
            strings = image.constants.strings.len(),
            methods = image.constants.methods.len(),
            "built image"
        );
        Ok(image)
    }

    fn check_pool(&self, pool: &ConstantPool) -> IrResult<()> {
        let limits = [
            ("strings", pool.strings.len(), self.config.max_strings),
            ("types", pool.types.len(), self.config.max_types),
            ("field references", pool.fields.len(), self.config.max_field_refs),
            ("method references", pool.methods.len(), self.config.max_method_refs),
        ];
        for (what, count, limit) in limits {
            if count > limit as usize {
                return Err(IrError::CapacityExceeded {
                    what,
                    count,
                    limit: limit as usize,
                });
            }
        }
        Ok(())
    }

    fn encode_class(
        &self,
        classpath: &Classpath,
        pool: &mut ConstantPoolBuilder,
        ty: TypeId,
    ) -> IrResult<ClassDef> {
        let mirror = classpath.ty(ty);
        let local = mirror
            .as_local()
            .ok_or_else(|| IrError::NotLocal(mirror.descriptor().to_string()))?;

        let fields = local
            .fields()
            .iter()
            .map(|&field| FieldDef {
                field: field_ref(classpath, pool, field),
                access: classpath.field_mirror(field).declaration().unwrap_or_default(),
            })
            .collect();

        let mut methods = Vec::with_capacity(local.methods().len());
        for &method in local.methods() {
            let code = match classpath.body(method) {
                Some(body) => Some(MethodEncoder::new(self, classpath, pool, method).encode(body)?),
                None => None,
            };
            methods.push(MethodDef {
                method: method_ref(classpath, pool, method),
                access: classpath.method_mirror(method).declaration().unwrap_or_default(),
                code,
            });
        }

        Ok(ClassDef {
            class: type_ref(classpath, pool, ty),
            access: local.access,
            superclass: local.superclass.map(|s| type_ref(classpath, pool, s)),
            interfaces: local
                .interfaces
                .iter()
                .map(|&i| type_ref(classpath, pool, i))
                .collect(),
            source_file: local.source_file.as_deref().map(|s| pool.string(s)),
            fields,
            methods,
        })
    }
}

/// Encode a classpath with default limits
pub fn encode(classpath: &Classpath) -> IrResult<Vec<u8>> {
    Encoder::default().encode(classpath)
}

fn type_ref(classpath: &Classpath, pool: &mut ConstantPoolBuilder, ty: TypeId) -> u32 {
    pool.ty(&classpath.ty(ty).descriptor().to_string())
}

fn method_ref(classpath: &Classpath, pool: &mut ConstantPoolBuilder, method: MethodId) -> u32 {
    let mirror = classpath.method_mirror(method);
    pool.method(
        &classpath.ty(mirror.owner()).descriptor().to_string(),
        mirror.name(),
        &mirror.signature().return_type.to_string(),
        &mirror.signature().parameter_strings(),
    )
}

fn field_ref(classpath: &Classpath, pool: &mut ConstantPoolBuilder, field: FieldId) -> u32 {
    let mirror = classpath.field_mirror(field);
    pool.field(
        &classpath.ty(mirror.owner()).descriptor().to_string(),
        mirror.name(),
        &mirror.ty().to_string(),
    )
}

/// Number of raw instructions an IR instruction lowers to
fn raw_len(instruction: &Instruction) -> u32 {
    match instruction {
        Instruction::Invoke(invoke)
            if invoke.kind() == InvokeKind::NewInstance || invoke.result().is_some() =>
        {
            2
        }
        _ => 1,
    }
}

struct MethodEncoder<'a> {
    encoder: &'a Encoder,
    classpath: &'a Classpath,
    pool: &'a mut ConstantPoolBuilder,
    method: MethodId,
}

impl<'a> MethodEncoder<'a> {
    fn new(
        encoder: &'a Encoder,
        classpath: &'a Classpath,
        pool: &'a mut ConstantPoolBuilder,
        method: MethodId,
    ) -> Self {
        Self {
            encoder,
            classpath,
            pool,
            method,
        }
    }

    fn encode(self, body: &CodeBody) -> IrResult<CodeItem> {
        let (encoder, classpath) = (self.encoder, self.classpath);
        let config = &encoder.config;
        let registers = RegisterMap::allocate(classpath, body, config.max_registers)?;

        // Raw start index of every IR instruction, for branch targets
        let mut starts = FxHashMap::default();
        let mut length = 0u32;
        let mut instructions = Vec::with_capacity(body.len());
        for &id in body.instructions() {
            let instruction = classpath
                .instruction(id)
                .ok_or(IrError::UnknownInstruction(id))?;
            starts.insert(id, length);
            length += raw_len(instruction);
            instructions.push(instruction);
        }
        if length > config.max_instructions_per_method {
            return Err(IrError::CapacityExceeded {
                what: "instructions per method",
                count: length as usize,
                limit: config.max_instructions_per_method as usize,
            });
        }

        let mut lowering = Lowering {
            encoder: self,
            registers: &registers,
            starts: &starts,
            insns: Vec::with_capacity(length as usize),
        };
        for instruction in instructions {
            lowering.lower(instruction)?;
        }
        let insns = lowering.insns;
        let method = lowering.encoder.method;

        trace!(
            method = %classpath.method_descriptor(method),
            registers = registers.registers_size(),
            ins = registers.ins_size(),
            insns = insns.len(),
            "encoded body"
        );
        Ok(CodeItem {
            registers_size: registers.registers_size(),
            ins_size: registers.ins_size(),
            register_kinds: registers.into_kinds(),
            insns,
        })
    }
}

struct Lowering<'a, 'b> {
    encoder: MethodEncoder<'a>,
    registers: &'b RegisterMap,
    starts: &'b FxHashMap<InsnId, u32>,
    insns: Vec<Insn>,
}

impl Lowering<'_, '_> {
    fn reg(&self, local: LocalVariable) -> IrResult<u16> {
        self.registers.register(local)
    }

    fn target(&self, id: InsnId) -> IrResult<u32> {
        self.starts.get(&id).copied().ok_or_else(|| {
            IrError::BranchTarget(format!(
                "{} is not in {}",
                id,
                self.encoder.classpath.method_descriptor(self.encoder.method)
            ))
        })
    }

    fn type_ref(&mut self, ty: TypeId) -> u32 {
        type_ref(self.encoder.classpath, self.encoder.pool, ty)
    }

    fn lower(&mut self, instruction: &Instruction) -> IrResult<()> {
        let insn = match instruction {
            Instruction::Invoke(invoke) => return self.lower_invoke(invoke),
            Instruction::LoadStore(access) => self.lower_field(access)?,
            Instruction::Const(c) => {
                let dst = self.reg(c.target())?;
                match c.value() {
                    ConstValue::Null => Insn::ConstNull { dst },
                    ConstValue::Int(value) => Insn::ConstInt { dst, value: *value },
                    ConstValue::Long(value) => Insn::ConstWide { dst, value: *value },
                    ConstValue::Float(value) => Insn::ConstFloat { dst, value: *value },
                    ConstValue::Double(value) => Insn::ConstDouble { dst, value: *value },
                    ConstValue::String(value) => Insn::ConstString {
                        dst,
                        string: self.encoder.pool.string(value),
                    },
                    ConstValue::Class(ty) => Insn::ConstClass {
                        dst,
                        ty: self.type_ref(*ty),
                    },
                }
            }
            Instruction::Move { target, source } => Insn::Move {
                dst: self.reg(*target)?,
                src: self.reg(*source)?,
            },
            Instruction::Return(None) => Insn::ReturnVoid,
            Instruction::Return(Some(value)) => Insn::Return {
                src: self.reg(*value)?,
            },
            Instruction::Branch(branch) => {
                let target = self.target(branch.target())?;
                match branch.test() {
                    None => Insn::Goto { target },
                    Some(test) => match test.rhs {
                        Some(rhs) => Insn::If {
                            cond: test.condition,
                            a: self.reg(test.lhs)?,
                            b: self.reg(rhs)?,
                            target,
                        },
                        None => Insn::IfZero {
                            cond: test.condition,
                            a: self.reg(test.lhs)?,
                            target,
                        },
                    },
                }
            }
            Instruction::Binary {
                op,
                target,
                lhs,
                rhs,
            } => Insn::Binary {
                op: *op,
                dst: self.reg(*target)?,
                a: self.reg(*lhs)?,
                b: self.reg(*rhs)?,
            },
            Instruction::NewArray {
                target,
                length,
                array_type,
            } => Insn::NewArray {
                dst: self.reg(*target)?,
                length: self.reg(*length)?,
                ty: self.type_ref(*array_type),
            },
            Instruction::ArrayLength { target, array } => Insn::ArrayLength {
                dst: self.reg(*target)?,
                array: self.reg(*array)?,
            },
            Instruction::CheckCast { target, value, ty } => Insn::CheckCast {
                dst: self.reg(*target)?,
                src: self.reg(*value)?,
                ty: self.type_ref(*ty),
            },
            Instruction::InstanceOf { target, value, ty } => Insn::InstanceOf {
                dst: self.reg(*target)?,
                src: self.reg(*value)?,
                ty: self.type_ref(*ty),
            },
            Instruction::Throw(value) => Insn::Throw {
                src: self.reg(*value)?,
            },
        };
        self.insns.push(insn);
        Ok(())
    }

    fn lower_invoke(&mut self, invoke: &Invoke) -> IrResult<()> {
        let classpath = self.encoder.classpath;
        let target = classpath.method_mirror(invoke.method());
        if target.is_static() == TriState::Unknown {
            return Err(IrError::UnresolvedSymbol(format!(
                "static marker of {} is unknown",
                classpath.method_descriptor(invoke.method())
            )));
        }

        let mut args = Vec::with_capacity(invoke.parameters().len() + 1);
        if invoke.kind() == InvokeKind::NewInstance {
            if let Some(instance) = invoke.result() {
                args.push(self.reg(instance)?);
            }
        }
        for &param in invoke.parameters() {
            args.push(self.reg(param)?);
        }
        let limit = self.encoder.encoder.config.max_invoke_arguments;
        if args.len() > limit as usize {
            return Err(IrError::CapacityExceeded {
                what: "invoke arguments",
                count: args.len(),
                limit: limit as usize,
            });
        }

        let kind = match invoke.kind() {
            InvokeKind::Normal if target.is_static() == TriState::True => InvokeType::Static,
            InvokeKind::Normal if classpath.ty(target.owner()).is_interface() => {
                InvokeType::Interface
            }
            InvokeKind::Normal => InvokeType::Virtual,
            InvokeKind::Special => {
                let enclosing = classpath.method_mirror(self.encoder.method).owner();
                if target.is_constructor() || target.owner() == enclosing {
                    InvokeType::Direct
                } else {
                    InvokeType::Super
                }
            }
            InvokeKind::NewInstance => InvokeType::Direct,
        };
        let method = method_ref(classpath, self.encoder.pool, invoke.method());

        if invoke.kind() == InvokeKind::NewInstance {
            let Some(&dst) = args.first() else {
                return Err(IrError::ArityMismatch(format!(
                    "new-instance of {} has no instance local",
                    classpath.method_descriptor(invoke.method())
                )));
            };
            let ty = self.type_ref(target.owner());
            self.insns.push(Insn::NewInstance { dst, ty });
            self.insns.push(Insn::Invoke { kind, method, args });
            return Ok(());
        }

        self.insns.push(Insn::Invoke { kind, method, args });
        if let Some(result) = invoke.result() {
            let dst = self.reg(result)?;
            self.insns.push(Insn::MoveResult { dst });
        }
        Ok(())
    }

    fn lower_field(&mut self, access: &LoadStore) -> IrResult<Insn> {
        let classpath = self.encoder.classpath;
        if classpath.field_mirror(access.field()).is_static() == TriState::Unknown {
            return Err(IrError::UnresolvedSymbol(format!(
                "static marker of {} is unknown",
                classpath.field_descriptor(access.field())
            )));
        }
        let field = field_ref(classpath, self.encoder.pool, access.field());
        let value = self.reg(access.value())?;
        let object = access.instance().map(|i| self.reg(i)).transpose()?;

        Ok(match (access.kind(), object) {
            (LoadStoreKind::Load, None) => Insn::StaticGet { dst: value, field },
            (LoadStoreKind::Load, Some(object)) => Insn::InstanceGet {
                dst: value,
                object,
                field,
            },
            (LoadStoreKind::Store, None) => Insn::StaticPut { src: value, field },
            (LoadStoreKind::Store, Some(object)) => Insn::InstancePut {
                src: value,
                object,
                field,
            },
        })
    }
}
