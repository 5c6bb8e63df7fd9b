//! Image decoding
//!
//! Turns images into local types on a [`Classpath`]. Each image is decoded
//! into a staged copy of the classpath that replaces the live one only when
//! the whole image succeeded.

use crate::classpath::Classpath;
use crate::code::{Branch, Const, InsnId, Instruction, Invoke, LoadStore, LocalVariable};
use crate::descriptor::{MethodSignature, TypeDescriptor, ValueKind};
use crate::error::{IrError, IrResult};
use crate::symbols::{FieldId, MethodId, TriState, TypeDefinition, TypeId};
use dexir_image::{register_kind, verify_image, CodeItem, Image, Insn, InvokeType};
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

/// Decodes one or more images into a classpath
#[derive(Debug, Default)]
pub struct Decoder {
    classpath: Classpath,
}

impl Decoder {
    /// Decoder starting from an empty classpath
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder adding images to an existing classpath
    pub fn with_classpath(classpath: Classpath) -> Self {
        Self { classpath }
    }

    /// Decode an encoded image
    pub fn add(&mut self, bytes: &[u8]) -> IrResult<()> {
        let image = Image::decode(bytes)?;
        self.add_image(&image)
    }

    /// Decode an already parsed image
    ///
    /// On error the classpath is left exactly as it was before the call.
    pub fn add_image(&mut self, image: &Image) -> IrResult<()> {
        verify_image(image)?;
        self.check_duplicates(image)?;
        debug!(classes = image.classes.len(), "decoding image");

        let mut staged = self.classpath.clone();
        match ImageLoader::new(&mut staged, &self.classpath, image).load() {
            Ok(()) => {
                self.classpath = staged;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "image rejected, classpath rolled back");
                Err(err)
            }
        }
    }

    /// Classpath decoded so far
    pub fn classpath(&self) -> &Classpath {
        &self.classpath
    }

    /// Finish decoding
    pub fn finish(self) -> Classpath {
        self.classpath
    }

    fn check_duplicates(&self, image: &Image) -> IrResult<()> {
        let mut seen = FxHashSet::default();
        for class in &image.classes {
            let name = image
                .constants
                .get_type(class.class)
                .ok_or_else(|| IrError::MalformedImage(format!("class type {}", class.class)))?;
            if !seen.insert(name) {
                return Err(IrError::DuplicateType(name.to_string()));
            }
            let defined = TypeDescriptor::parse(name)
                .ok()
                .and_then(|desc| self.classpath.find_type(&desc))
                .is_some_and(|id| self.classpath.ty(id).is_local());
            if defined {
                return Err(IrError::DuplicateType(name.to_string()));
            }
        }
        Ok(())
    }
}

/// Decode a single encoded image into a fresh classpath
pub fn decode(bytes: &[u8]) -> IrResult<Classpath> {
    let mut decoder = Decoder::new();
    decoder.add(bytes)?;
    Ok(decoder.finish())
}

/// Errors that mean the image itself is inconsistent
fn malformed(err: IrError) -> IrError {
    match err {
        IrError::InvalidDescriptor(_)
        | IrError::ArityMismatch(_)
        | IrError::NotAConstructor(_)
        | IrError::ForeignVariable(_)
        | IrError::BranchTarget(_)
        | IrError::NotLocal(_)
        | IrError::DuplicateMember(_) => IrError::MalformedImage(err.to_string()),
        other => other,
    }
}

/// Operands or bodies that contradict the image's own declarations
fn inconsistent(err: IrError) -> IrError {
    match err {
        IrError::SignatureConflict(message) => IrError::MalformedImage(message),
        other => malformed(other),
    }
}

struct ImageLoader<'a> {
    classpath: &'a mut Classpath,
    /// The classpath as it was before this image
    before: &'a Classpath,
    image: &'a Image,
}

/// A run of raw instructions that becomes one IR instruction
struct Unit {
    start: usize,
    len: usize,
}

impl<'a> ImageLoader<'a> {
    fn new(classpath: &'a mut Classpath, before: &'a Classpath, image: &'a Image) -> Self {
        Self {
            classpath,
            before,
            image,
        }
    }

    fn load(mut self) -> IrResult<()> {
        let image = self.image;
        let mut bodies = Vec::new();

        for class in &image.classes {
            let owner = self.define_class(class.class, class)?;
            for field in &class.fields {
                let (_, name, ty) = self.field_key(field.field)?;
                self.classpath
                    .declare_field(owner, &name, &ty, field.access)
                    .map_err(malformed)?;
            }
            for method in &class.methods {
                let (_, name, signature) = self.method_key(method.method)?;
                let id = self
                    .classpath
                    .declare_method(owner, &name, &signature, method.access)
                    .map_err(malformed)?;
                if let Some(code) = &method.code {
                    bodies.push((id, code));
                }
            }
            trace!(
                class = %self.classpath.ty(owner).descriptor(),
                fields = class.fields.len(),
                methods = class.methods.len(),
                "declared class"
            );
        }

        for (method, code) in bodies {
            self.load_body(method, code).map_err(malformed)?;
        }
        Ok(())
    }

    fn define_class(&mut self, class: u32, def: &dexir_image::ClassDef) -> IrResult<TypeId> {
        let descriptor = self.type_descriptor(class)?;
        let superclass = def.superclass.map(|ty| self.ty(ty)).transpose()?;
        let mut interfaces = Vec::with_capacity(def.interfaces.len());
        for &interface in &def.interfaces {
            let id = self.ty(interface)?;
            if !self.classpath.ty(id).is_local() {
                self.classpath.set_interface(id, true)?;
            }
            interfaces.push(id);
        }
        let source_file = def.source_file.map(|s| self.string(s)).transpose()?;

        self.classpath
            .define_type(
                &descriptor,
                TypeDefinition {
                    access: def.access,
                    superclass,
                    interfaces,
                    source_file,
                },
            )
            .map_err(malformed)
    }

    // ===== Constant pool resolution =====

    fn string(&self, index: u32) -> IrResult<String> {
        self.image
            .constants
            .get_string(index)
            .map(str::to_string)
            .ok_or_else(|| IrError::MalformedImage(format!("string index {}", index)))
    }

    fn type_descriptor(&self, index: u32) -> IrResult<TypeDescriptor> {
        let text = self
            .image
            .constants
            .get_type(index)
            .ok_or_else(|| IrError::MalformedImage(format!("type index {}", index)))?;
        TypeDescriptor::parse(text).map_err(malformed)
    }

    fn ty(&mut self, index: u32) -> IrResult<TypeId> {
        let descriptor = self.type_descriptor(index)?;
        self.classpath.type_mirror(&descriptor).map_err(malformed)
    }

    fn method_key(&mut self, index: u32) -> IrResult<(TypeId, String, MethodSignature)> {
        let image = self.image;
        let pool = &image.constants;
        let method = *pool
            .get_method(index)
            .ok_or_else(|| IrError::MalformedImage(format!("method index {}", index)))?;
        let proto = pool
            .get_proto(method.proto)
            .ok_or_else(|| IrError::MalformedImage(format!("proto index {}", method.proto)))?;
        let return_type = self.type_descriptor(proto.return_type)?;
        let parameters = proto
            .parameters
            .iter()
            .map(|&p| self.type_descriptor(p))
            .collect::<IrResult<Vec<_>>>()?;
        let name = self.string(method.name)?;
        let owner = self.ty(method.class)?;
        Ok((owner, name, MethodSignature::new(return_type, parameters)))
    }

    fn field_key(&mut self, index: u32) -> IrResult<(TypeId, String, TypeDescriptor)> {
        let image = self.image;
        let field = *image
            .constants
            .get_field(index)
            .ok_or_else(|| IrError::MalformedImage(format!("field index {}", index)))?;
        let ty = self.type_descriptor(field.ty)?;
        let name = self.string(field.name)?;
        let owner = self.ty(field.class)?;
        Ok((owner, name, ty))
    }

    fn method(&mut self, index: u32, is_static: TriState) -> IrResult<MethodId> {
        let (owner, name, signature) = self.method_key(index)?;
        self.classpath
            .method(owner, &name, &signature, is_static)
            .map_err(|err| {
                let known = self
                    .before
                    .find_type(self.classpath.ty(owner).descriptor())
                    .and_then(|ty| self.before.find_method(ty, &name, &signature))
                    .is_some_and(|m| self.before.method_mirror(m).is_static() != TriState::Unknown);
                self.marker_conflict(err, known)
            })
    }

    fn field(&mut self, index: u32, is_static: TriState) -> IrResult<FieldId> {
        let (owner, name, ty) = self.field_key(index)?;
        self.classpath
            .field(owner, &name, &ty, is_static)
            .map_err(|err| {
                let known = self
                    .before
                    .find_type(self.classpath.ty(owner).descriptor())
                    .and_then(|owner| self.before.find_field(owner, &name, &ty))
                    .is_some_and(|f| self.before.field_mirror(f).is_static() != TriState::Unknown);
                self.marker_conflict(err, known)
            })
    }

    /// A marker conflict is the caller's only when an earlier image fixed the marker
    fn marker_conflict(&self, err: IrError, known_before: bool) -> IrError {
        if known_before {
            err
        } else {
            inconsistent(err)
        }
    }

    // ===== Code =====

    fn load_body(&mut self, method: MethodId, code: &CodeItem) -> IrResult<()> {
        let registers = self.assign_registers(method, code)?;
        let local = |register: u16| -> IrResult<LocalVariable> {
            registers
                .get(register as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    IrError::MalformedImage(format!(
                        "v{} is the high half of a register pair",
                        register
                    ))
                })
        };

        // Group raw instructions into units; nops map to the following unit
        let mut units = Vec::new();
        let mut unit_of = vec![0usize; code.insns.len()];
        let mut index = 0;
        while index < code.insns.len() {
            let len = match (&code.insns[index], code.insns.get(index + 1)) {
                (Insn::Nop, _) => 0,
                (Insn::NewInstance { .. }, Some(Insn::Invoke { .. })) => 2,
                (Insn::Invoke { .. }, Some(Insn::MoveResult { .. })) => 2,
                _ => 1,
            };
            unit_of[index] = units.len();
            if len == 0 {
                index += 1;
                continue;
            }
            for slot in unit_of.iter_mut().skip(index).take(len) {
                *slot = units.len();
            }
            units.push(Unit { start: index, len });
            index += len;
        }

        let first = self.classpath.reserve(units.len()).as_u32();
        let unit_id = |raw: u32| InsnId(first + unit_of[raw as usize] as u32);

        for (n, unit) in units.iter().enumerate() {
            let insns = &code.insns[unit.start..unit.start + unit.len];
            let instruction = self.decode_unit(insns, &local, &unit_id)?;
            self.classpath
                .append_reserved(method, InsnId(first + n as u32), instruction)?;
        }

        trace!(
            method = %self.classpath.method_descriptor(method),
            registers = code.registers_size,
            instructions = units.len(),
            "decoded body"
        );
        Ok(())
    }

    /// One local per register; parameters take the top `ins_size` registers
    fn assign_registers(
        &mut self,
        method: MethodId,
        code: &CodeItem,
    ) -> IrResult<Vec<Option<LocalVariable>>> {
        let parameters = self.classpath.create_body(method).map_err(inconsistent)?;
        let size = code.registers_size as usize;
        let first_parameter = size - code.ins_size as usize;
        let mut registers = vec![None; size];

        let mut register = first_parameter;
        for parameter in parameters {
            let fits = register + parameter.kind().slots() as usize <= size
                && register_kind::is_wide(code.register_kinds[register]) == parameter.kind().is_wide();
            if !fits {
                return Err(IrError::MalformedImage(format!(
                    "parameter registers of {} do not match its signature",
                    self.classpath.method_descriptor(method)
                )));
            }
            registers[register] = Some(parameter);
            register += parameter.kind().slots() as usize;
        }
        if register != size {
            return Err(IrError::MalformedImage(format!(
                "{} declares {} parameter registers, signature needs {}",
                self.classpath.method_descriptor(method),
                code.ins_size,
                register - first_parameter
            )));
        }

        for (slot, &tag) in registers.iter_mut().zip(&code.register_kinds).take(first_parameter) {
            *slot = ValueKind::from_register_kind(tag).map(LocalVariable::new);
        }
        Ok(registers)
    }

    fn decode_unit(
        &mut self,
        insns: &[Insn],
        local: &impl Fn(u16) -> IrResult<LocalVariable>,
        unit_id: &impl Fn(u32) -> InsnId,
    ) -> IrResult<Instruction> {
        let instruction: Instruction = match &insns[0] {
            Insn::NewInstance { dst, ty } => {
                let Some(Insn::Invoke { method, args, .. }) = insns.get(1) else {
                    return Err(IrError::MalformedImage("new-instance without constructor".into()));
                };
                let constructor = self.method(*method, TriState::False)?;
                let allocated = self.ty(*ty)?;
                if self.classpath.method_mirror(constructor).owner() != allocated {
                    return Err(IrError::MalformedImage(format!(
                        "new-instance type does not own {}",
                        self.classpath.method_descriptor(constructor)
                    )));
                }
                let mut builder = Invoke::builder()
                    .new_instance()
                    .method(constructor)
                    .return_value(local(*dst)?);
                for &arg in args.iter().skip(1) {
                    builder = builder.parameter(local(arg)?);
                }
                builder.build(self.classpath).map_err(inconsistent)?.into()
            }
            Insn::Invoke { kind, method, args } => {
                let hint = TriState::from_bool(*kind == InvokeType::Static);
                let target = self.method(*method, hint)?;
                if *kind == InvokeType::Interface {
                    let owner = self.classpath.method_mirror(target).owner();
                    if !self.classpath.ty(owner).is_local() {
                        self.classpath.set_interface(owner, true)?;
                    }
                }
                let mut builder = Invoke::builder().method(target);
                if matches!(kind, InvokeType::Direct | InvokeType::Super) {
                    builder = builder.special();
                }
                for &arg in args {
                    builder = builder.parameter(local(arg)?);
                }
                let result = match insns.get(1) {
                    Some(Insn::MoveResult { dst }) => Some(local(*dst)?),
                    // Ignored results get a local of their own
                    _ => self
                        .classpath
                        .method_mirror(target)
                        .signature()
                        .return_type
                        .value_kind()
                        .map(LocalVariable::new),
                };
                if let Some(result) = result {
                    builder = builder.return_value(result);
                }
                builder.build(self.classpath).map_err(inconsistent)?.into()
            }
            Insn::Nop | Insn::MoveResult { .. } => {
                return Err(IrError::MalformedImage(format!(
                    "unexpected {}",
                    insns[0].opcode()
                )))
            }
            Insn::Move { dst, src } => Instruction::Move {
                target: local(*dst)?,
                source: local(*src)?,
            },
            Insn::ReturnVoid => Instruction::Return(None),
            Insn::Return { src } => Instruction::Return(Some(local(*src)?)),
            Insn::ConstInt { dst, value } => Const::int(local(*dst)?, *value).into(),
            Insn::ConstWide { dst, value } => Const::long(local(*dst)?, *value).into(),
            Insn::ConstFloat { dst, value } => Const::float(local(*dst)?, *value).into(),
            Insn::ConstDouble { dst, value } => Const::double(local(*dst)?, *value).into(),
            Insn::ConstString { dst, string } => {
                Const::string(local(*dst)?, self.string(*string)?).into()
            }
            Insn::ConstClass { dst, ty } => Const::class(local(*dst)?, self.ty(*ty)?).into(),
            Insn::ConstNull { dst } => Const::null(local(*dst)?).into(),
            Insn::NewArray { dst, length, ty } => Instruction::NewArray {
                target: local(*dst)?,
                length: local(*length)?,
                array_type: self.ty(*ty)?,
            },
            Insn::ArrayLength { dst, array } => Instruction::ArrayLength {
                target: local(*dst)?,
                array: local(*array)?,
            },
            Insn::CheckCast { dst, src, ty } => Instruction::CheckCast {
                target: local(*dst)?,
                value: local(*src)?,
                ty: self.ty(*ty)?,
            },
            Insn::InstanceOf { dst, src, ty } => Instruction::InstanceOf {
                target: local(*dst)?,
                value: local(*src)?,
                ty: self.ty(*ty)?,
            },
            Insn::Throw { src } => Instruction::Throw(local(*src)?),
            Insn::Goto { target } => Branch::goto(unit_id(*target)).into(),
            Insn::If { cond, a, b, target } => {
                Branch::compare(*cond, local(*a)?, local(*b)?, unit_id(*target)).into()
            }
            Insn::IfZero { cond, a, target } => {
                Branch::zero(*cond, local(*a)?, unit_id(*target)).into()
            }
            Insn::Binary { op, dst, a, b } => Instruction::Binary {
                op: *op,
                target: local(*dst)?,
                lhs: local(*a)?,
                rhs: local(*b)?,
            },
            Insn::InstanceGet { dst, object, field } => {
                let field = self.field(*field, TriState::False)?;
                LoadStore::load()
                    .field(field)
                    .value(local(*dst)?)
                    .instance(local(*object)?)
                    .build(self.classpath)
                    .map_err(inconsistent)?
                    .into()
            }
            Insn::InstancePut { src, object, field } => {
                let field = self.field(*field, TriState::False)?;
                LoadStore::store()
                    .field(field)
                    .value(local(*src)?)
                    .instance(local(*object)?)
                    .build(self.classpath)
                    .map_err(inconsistent)?
                    .into()
            }
            Insn::StaticGet { dst, field } => {
                let field = self.field(*field, TriState::True)?;
                LoadStore::load()
                    .field(field)
                    .value(local(*dst)?)
                    .build(self.classpath)
                    .map_err(inconsistent)?
                    .into()
            }
            Insn::StaticPut { src, field } => {
                let field = self.field(*field, TriState::True)?;
                LoadStore::store()
                    .field(field)
                    .value(local(*src)?)
                    .build(self.classpath)
                    .map_err(inconsistent)?
                    .into()
            }
        };
        Ok(instruction)
    }
}
