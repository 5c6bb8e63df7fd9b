//! Pretty-printing for classpaths
//!
//! Renders local types and their bodies as text. Locals are numbered by first
//! appearance (parameters first) and branch targets by body position, so the
//! output does not depend on instruction ids or register numbers.

use crate::classpath::Classpath;
use crate::code::{ConstValue, InsnId, Instruction, InvokeKind, LoadStoreKind, LocalVariable};
use crate::symbols::{MethodId, TypeId};
use rustc_hash::FxHashMap;
use std::fmt::{self, Write};

/// Render every local type, in definition order
pub fn dump_classpath(classpath: &Classpath) -> String {
    ClasspathDump(classpath).to_string()
}

/// Render one method: header and, if present, body
pub fn dump_method(classpath: &Classpath, method: MethodId) -> String {
    MethodDump { classpath, method }.to_string()
}

struct ClasspathDump<'a>(&'a Classpath);

impl fmt::Display for ClasspathDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classpath = self.0;
        for ty in classpath.local_types() {
            write_type(f, classpath, ty)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_type(f: &mut fmt::Formatter<'_>, classpath: &Classpath, ty: TypeId) -> fmt::Result {
    let mirror = classpath.ty(ty);
    let Some(local) = mirror.as_local() else {
        return writeln!(f, "; external {}", mirror.descriptor());
    };

    write!(f, "class {} access 0x{:x}", mirror.descriptor(), local.access)?;
    if let Some(superclass) = local.superclass {
        write!(f, " extends {}", classpath.ty(superclass).descriptor())?;
    }
    for &interface in &local.interfaces {
        write!(f, " implements {}", classpath.ty(interface).descriptor())?;
    }
    if let Some(source) = &local.source_file {
        write!(f, " source {:?}", source)?;
    }
    writeln!(f)?;

    for &field in local.fields() {
        let mirror = classpath.field_mirror(field);
        writeln!(
            f,
            "  field {}:{} access 0x{:x}",
            mirror.name(),
            mirror.ty(),
            mirror.declaration().unwrap_or_default()
        )?;
    }
    for &method in local.methods() {
        MethodDump { classpath, method }.write(f, "  ")?;
    }
    Ok(())
}

struct MethodDump<'a> {
    classpath: &'a Classpath,
    method: MethodId,
}

impl fmt::Display for MethodDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, "")
    }
}

impl MethodDump<'_> {
    fn write(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let classpath = self.classpath;
        let mirror = classpath.method_mirror(self.method);
        write!(f, "{}method {}{}", indent, mirror.name(), mirror.signature())?;
        if let Some(access) = mirror.declaration() {
            write!(f, " access 0x{:x}", access)?;
        }
        let Some(body) = mirror.body() else {
            return writeln!(f);
        };

        let mut names = LocalNames::default();
        for &param in body.parameters() {
            names.name(param);
        }
        let params: Vec<String> = body.parameters().iter().map(|&p| names.name(p)).collect();
        writeln!(f, " ({}) {{", params.join(", "))?;

        let positions: FxHashMap<_, _> = body
            .instructions()
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();
        for (position, &id) in body.instructions().iter().enumerate() {
            let Some(instruction) = classpath.instruction(id) else {
                continue;
            };
            let text = render(classpath, instruction, &mut names, |target| {
                positions
                    .get(&target)
                    .map_or_else(|| format!("{}", target), |p| format!("@{}", p))
            });
            writeln!(f, "{}  {:>3}: {}", indent, position, text)?;
        }
        writeln!(f, "{}}}", indent)
    }
}

#[derive(Default)]
struct LocalNames {
    names: FxHashMap<LocalVariable, usize>,
}

impl LocalNames {
    fn name(&mut self, local: LocalVariable) -> String {
        let next = self.names.len();
        let n = *self.names.entry(local).or_insert(next);
        format!("v{}:{}", n, local.kind())
    }
}

fn render(
    classpath: &Classpath,
    instruction: &Instruction,
    names: &mut LocalNames,
    label: impl Fn(InsnId) -> String,
) -> String {
    // Name operands in writes-then-reads order so numbering is stable
    for local in instruction.locals() {
        names.name(local);
    }
    let mut n = |local: LocalVariable| names.name(local);
    let mut out = String::new();

    match instruction {
        Instruction::Invoke(invoke) => {
            let args: Vec<String> = invoke.parameters().iter().map(|&p| n(p)).collect();
            let op = match invoke.kind() {
                InvokeKind::Normal => "invoke",
                InvokeKind::Special => "invoke-special",
                InvokeKind::NewInstance => "new-instance",
            };
            if let Some(result) = invoke.result() {
                let _ = write!(out, "{} = ", n(result));
            }
            let _ = write!(
                out,
                "{} {} ({})",
                op,
                classpath.method_descriptor(invoke.method()),
                args.join(", ")
            );
        }
        Instruction::Const(c) => {
            let value = match c.value() {
                ConstValue::Null => "null".to_string(),
                ConstValue::Int(v) => format!("int {}", v),
                ConstValue::Long(v) => format!("long {}", v),
                ConstValue::Float(v) => format!("float {:?}", v),
                ConstValue::Double(v) => format!("double {:?}", v),
                ConstValue::String(v) => format!("string {:?}", v),
                ConstValue::Class(ty) => format!("class {}", classpath.ty(*ty).descriptor()),
            };
            let _ = write!(out, "{} = const {}", n(c.target()), value);
        }
        Instruction::LoadStore(access) => {
            let field = classpath.field_descriptor(access.field());
            let instance = access.instance().map(|i| format!(" {}", n(i))).unwrap_or_default();
            let _ = match access.kind() {
                LoadStoreKind::Load => {
                    write!(out, "{} = load{} {}", n(access.value()), instance, field)
                }
                LoadStoreKind::Store => {
                    write!(out, "store {}{} {}", n(access.value()), instance, field)
                }
            };
        }
        Instruction::Move { target, source } => {
            let _ = write!(out, "{} = {}", n(*target), n(*source));
        }
        Instruction::Return(None) => out.push_str("return"),
        Instruction::Return(Some(value)) => {
            let _ = write!(out, "return {}", n(*value));
        }
        Instruction::Branch(branch) => {
            let target = label(branch.target());
            let _ = match branch.test() {
                None => write!(out, "goto {}", target),
                Some(test) => match test.rhs {
                    Some(rhs) => write!(
                        out,
                        "if-{} {}, {} {}",
                        test.condition.name(),
                        n(test.lhs),
                        n(rhs),
                        target
                    ),
                    None => write!(
                        out,
                        "if-{}z {} {}",
                        test.condition.name(),
                        n(test.lhs),
                        target
                    ),
                },
            };
        }
        Instruction::Binary {
            op,
            target,
            lhs,
            rhs,
        } => {
            let _ = write!(out, "{} = {} {}, {}", n(*target), op.name(), n(*lhs), n(*rhs));
        }
        Instruction::NewArray {
            target,
            length,
            array_type,
        } => {
            let _ = write!(
                out,
                "{} = new-array {} {}",
                n(*target),
                classpath.ty(*array_type).descriptor(),
                n(*length)
            );
        }
        Instruction::ArrayLength { target, array } => {
            let _ = write!(out, "{} = array-length {}", n(*target), n(*array));
        }
        Instruction::CheckCast { target, value, ty } => {
            let _ = write!(
                out,
                "{} = check-cast {} {}",
                n(*target),
                classpath.ty(*ty).descriptor(),
                n(*value)
            );
        }
        Instruction::InstanceOf { target, value, ty } => {
            let _ = write!(
                out,
                "{} = instance-of {} {}",
                n(*target),
                classpath.ty(*ty).descriptor(),
                n(*value)
            );
        }
        Instruction::Throw(value) => {
            let _ = write!(out, "throw {}", n(*value));
        }
    }
    out
}
