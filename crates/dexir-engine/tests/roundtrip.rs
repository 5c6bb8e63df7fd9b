//! Encode/decode round trips and codec errors

mod common;

use common::*;
use dexir_engine::{
    access, decode, encode, pretty, BinaryOp, Branch, Classpath, CodecConfig, Condition, Const,
    Decoder, Encoder, Instruction, Invoke, IrError, LoadStore, LocalVariable, MethodSignature,
    ReferenceKind, TriState, TypeDefinition, TypeDescriptor,
};
use dexir_image::{Image, Insn};

fn object() -> TypeDescriptor {
    TypeDescriptor::object("java/lang/Object")
}

fn void() -> MethodSignature {
    MethodSignature::new(TypeDescriptor::Void, vec![])
}

/// A class exercising every instruction variant
fn counter_classpath() -> Classpath {
    let mut cp = Classpath::new();
    let object_ty = cp.type_mirror(&object()).unwrap();
    let runnable = cp
        .type_mirror(&TypeDescriptor::object("java/lang/Runnable"))
        .unwrap();
    cp.set_interface(runnable, true).unwrap();
    let counter = cp
        .define_type(
            &TypeDescriptor::object("Counter"),
            TypeDefinition {
                access: access::PUBLIC,
                superclass: Some(object_ty),
                interfaces: vec![runnable],
                source_file: Some("Counter.java".into()),
            },
        )
        .unwrap();
    let count = cp
        .declare_field(counter, "count", &TypeDescriptor::Int, access::PRIVATE)
        .unwrap();
    let total = cp
        .declare_field(
            counter,
            "TOTAL",
            &TypeDescriptor::Long,
            access::PUBLIC | access::STATIC,
        )
        .unwrap();

    // <init>()V { super(); return }
    let init = cp
        .declare_method(counter, "<init>", &void(), access::PUBLIC | access::CONSTRUCTOR)
        .unwrap();
    let this = cp.create_body(init).unwrap()[0];
    let object_init = cp.method(object_ty, "<init>", &void(), TriState::False).unwrap();
    let call = Invoke::builder()
        .special()
        .method(object_init)
        .parameter(this)
        .build(&cp)
        .unwrap();
    cp.append(init, call).unwrap();
    cp.append(init, Instruction::Return(None)).unwrap();

    // run()V: bump both counters, call another runnable below the limit
    let run = cp.declare_method(counter, "run", &void(), access::PUBLIC).unwrap();
    let this = cp.create_body(run).unwrap()[0];
    let ret = cp.append(run, Instruction::Return(None)).unwrap();
    let current = LocalVariable::int();
    let one = LocalVariable::int();
    let sum = LocalVariable::int();
    let limit = LocalVariable::int();
    let wide = LocalVariable::long();
    let five = LocalVariable::long();
    let wide_sum = LocalVariable::long();
    let runnable_run = cp.method(runnable, "run", &void(), TriState::False).unwrap();
    let body: Vec<Instruction> = vec![
        LoadStore::load().field(count).value(current).instance(this).build(&cp).unwrap().into(),
        Const::int(one, 1).into(),
        Instruction::Binary {
            op: BinaryOp::Add,
            target: sum,
            lhs: current,
            rhs: one,
        },
        LoadStore::store().field(count).value(sum).instance(this).build(&cp).unwrap().into(),
        LoadStore::load().field(total).value(wide).build(&cp).unwrap().into(),
        Const::long(five, 5).into(),
        Instruction::Binary {
            op: BinaryOp::Add,
            target: wide_sum,
            lhs: wide,
            rhs: five,
        },
        LoadStore::store().field(total).value(wide_sum).build(&cp).unwrap().into(),
        Const::int(limit, 10).into(),
        Branch::compare(Condition::Ge, sum, limit, ret).into(),
        Invoke::builder().method(runnable_run).parameter(this).build(&cp).unwrap().into(),
    ];
    for instruction in body {
        cp.add_before(ret, instruction).unwrap();
    }

    // static size(Ljava/lang/Object;)I: array length or zero
    let int_array = TypeDescriptor::array(TypeDescriptor::Int);
    let int_array_ty = cp.type_mirror(&int_array).unwrap();
    let size = cp
        .declare_method(
            counter,
            "size",
            &MethodSignature::new(TypeDescriptor::Int, vec![object()]),
            access::PUBLIC | access::STATIC,
        )
        .unwrap();
    let value = cp.create_body(size).unwrap()[0];
    let is_array = LocalVariable::boolean();
    let array = LocalVariable::reference();
    let length = LocalVariable::int();
    let zero = LocalVariable::int();
    let test = cp
        .append(
            size,
            Instruction::InstanceOf {
                target: is_array,
                value,
                ty: int_array_ty,
            },
        )
        .unwrap();
    cp.append(
        size,
        Instruction::CheckCast {
            target: array,
            value,
            ty: int_array_ty,
        },
    )
    .unwrap();
    cp.append(size, Instruction::ArrayLength { target: length, array }).unwrap();
    cp.append(size, Instruction::Return(Some(length))).unwrap();
    let zero_const = cp.append(size, Const::int(zero, 0)).unwrap();
    cp.append(size, Instruction::Return(Some(zero))).unwrap();
    cp.add_after(test, Branch::zero(Condition::Eq, is_array, zero_const)).unwrap();

    // static mix(JD)J with wide parameters
    let mix = cp
        .declare_method(
            counter,
            "mix",
            &MethodSignature::new(
                TypeDescriptor::Long,
                vec![TypeDescriptor::Long, TypeDescriptor::Double],
            ),
            access::STATIC,
        )
        .unwrap();
    let params = cp.create_body(mix).unwrap();
    let copy = LocalVariable::long();
    cp.append(
        mix,
        Instruction::Move {
            target: copy,
            source: params[0],
        },
    )
    .unwrap();
    cp.append(mix, Const::double(LocalVariable::double(), 2.25)).unwrap();
    cp.append(mix, Const::float(LocalVariable::float(), 1.5)).unwrap();
    cp.append(mix, Instruction::Return(Some(copy))).unwrap();

    // static fail()V { throw new IllegalStateException("...") }
    let fail = cp.declare_method(counter, "fail", &void(), access::STATIC).unwrap();
    cp.create_body(fail).unwrap();
    let exception = cp
        .type_mirror(&TypeDescriptor::object("java/lang/IllegalStateException"))
        .unwrap();
    let exception_init = cp
        .method(
            exception,
            "<init>",
            &MethodSignature::new(TypeDescriptor::Void, vec![string()]),
            TriState::False,
        )
        .unwrap();
    let message = LocalVariable::reference();
    let error = LocalVariable::reference();
    let class = LocalVariable::reference();
    let nothing = LocalVariable::reference();
    let items = LocalVariable::reference();
    cp.append(fail, Const::class(class, counter)).unwrap();
    cp.append(fail, Const::null(nothing)).unwrap();
    let length = one_int(&mut cp, fail);
    cp.append(
        fail,
        Instruction::NewArray {
            target: items,
            length,
            array_type: int_array_ty,
        },
    )
    .unwrap();
    cp.append(fail, Const::string(message, "unreachable")).unwrap();
    let new_error = Invoke::builder()
        .new_instance()
        .method(exception_init)
        .parameter(message)
        .return_value(error)
        .build(&cp)
        .unwrap();
    cp.append(fail, new_error).unwrap();
    cp.append(fail, Instruction::Throw(error)).unwrap();

    // Native: declared without code
    cp.declare_method(counter, "hash", &void(), access::PUBLIC | access::NATIVE)
        .unwrap();

    cp
}

fn one_int(cp: &mut Classpath, method: dexir_engine::MethodId) -> LocalVariable {
    let local = LocalVariable::int();
    cp.append(method, Const::int(local, 1)).unwrap();
    local
}

#[test]
fn test_roundtrip_identity() {
    let original = counter_classpath();
    let bytes = encode(&original).unwrap();
    let decoded = decode(&bytes).unwrap();

    assert_eq!(
        pretty::dump_classpath(&decoded),
        pretty::dump_classpath(&original)
    );
    // A second pass is byte-identical
    assert_eq!(encode(&decoded).unwrap(), bytes);
}

#[test]
fn test_unmodified_image_roundtrip() {
    let bytes = open_stream_bytes();
    let first = decode(&bytes).unwrap();
    let reencoded = encode(&first).unwrap();
    let second = decode(&reencoded).unwrap();
    assert_eq!(pretty::dump_classpath(&first), pretty::dump_classpath(&second));
    assert_eq!(encode(&second).unwrap(), reencoded);
}

#[test]
fn test_encoded_image_shape() {
    let cp = counter_classpath();
    let image = Encoder::default().build_image(&cp).unwrap();
    let class = &image.classes[0];
    assert_eq!(class.interfaces.len(), 1);
    assert_eq!(class.methods.len(), 6);
    assert!(class.methods[5].code.is_none());

    // mix(JD)J: copy (2) + double (2) + float (1) + params (2 + 2)
    let mix = class.methods[3].code.as_ref().unwrap();
    assert_eq!(mix.registers_size, 9);
    assert_eq!(mix.ins_size, 4);

    let run = class.methods[1].code.as_ref().unwrap();
    assert!(run.insns.iter().any(|insn| matches!(
        insn,
        Insn::Invoke {
            kind: dexir_image::InvokeType::Interface,
            ..
        }
    )));
    let init = class.methods[0].code.as_ref().unwrap();
    assert!(matches!(
        init.insns[0],
        Insn::Invoke {
            kind: dexir_image::InvokeType::Direct,
            ..
        }
    ));
}

#[test]
fn test_interface_flag_survives_roundtrip() {
    let bytes = encode(&counter_classpath()).unwrap();
    let mut decoded = decode(&bytes).unwrap();
    let runnable = decoded
        .type_mirror(&TypeDescriptor::object("java/lang/Runnable"))
        .unwrap();
    assert!(decoded.ty(runnable).is_interface());
    let run = decoded
        .find_method(runnable, "run", &void())
        .unwrap();
    assert_eq!(decoded.references(run).count(ReferenceKind::Invoke), 1);
}

#[test]
fn test_decoded_identity() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    let a = cp.type_mirror(&url()).unwrap();
    let b = cp.type_mirror(&url()).unwrap();
    assert_eq!(a, b);
    let m1 = open_stream(&mut cp);
    let m2 = cp
        .method(a, "openStream", &open_stream_signature(), TriState::Unknown)
        .unwrap();
    assert_eq!(m1, m2);
    assert_eq!(cp.method_mirror(m1).is_static(), TriState::False);
}

#[test]
fn test_malformed_images() {
    let bytes = open_stream_bytes();
    assert!(matches!(decode(&bytes[..10]), Err(IrError::MalformedImage(_))));

    let mut corrupted = bytes.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    assert!(matches!(decode(&corrupted), Err(IrError::MalformedImage(_))));

    // Structurally broken code is caught by the verifier
    let mut image = open_stream_image();
    let code = image.classes[0].methods[0].code.as_mut().unwrap();
    code.insns.pop();
    assert!(matches!(
        decode(&image.encode()),
        Err(IrError::MalformedImage(_))
    ));

    // Parameter registers that disagree with the signature
    let mut image = open_stream_image();
    image.classes[0].methods[0].code.as_mut().unwrap().ins_size = 2;
    assert!(matches!(
        decode(&image.encode()),
        Err(IrError::MalformedImage(_))
    ));

    // Array nesting far beyond what a descriptor may carry
    let mut pool = dexir_image::ConstantPoolBuilder::new();
    let class = pool.ty("LBroken;");
    let deep = format!("{}I", "[".repeat(1_000_000));
    let field = pool.field("LBroken;", "table", &deep);
    let mut image = Image::new();
    image.constants = pool.build();
    image.classes.push(dexir_image::ClassDef {
        class,
        access: access::PUBLIC,
        superclass: None,
        interfaces: vec![],
        source_file: None,
        fields: vec![dexir_image::FieldDef {
            field,
            access: access::STATIC,
        }],
        methods: vec![],
    });
    assert!(matches!(
        decode(&image.encode()),
        Err(IrError::MalformedImage(_))
    ));
}

/// `LBroken;` with one method `run()V` whose code is built by `insns`
fn broken_image(
    access_flags: u32,
    register_kinds: Vec<u8>,
    insns: impl FnOnce(&mut dexir_image::ConstantPoolBuilder) -> Vec<Insn>,
) -> Vec<u8> {
    let mut pool = dexir_image::ConstantPoolBuilder::new();
    let class = pool.ty("LBroken;");
    let run = pool.method("LBroken;", "run", "V", &[]);
    let insns = insns(&mut pool);
    let mut image = Image::new();
    image.constants = pool.build();
    image.classes.push(dexir_image::ClassDef {
        class,
        access: access::PUBLIC,
        superclass: None,
        interfaces: vec![],
        source_file: None,
        fields: vec![],
        methods: vec![dexir_image::MethodDef {
            method: run,
            access: access_flags,
            code: Some(dexir_image::CodeItem {
                registers_size: register_kinds.len() as u16,
                ins_size: 0,
                register_kinds,
                insns,
            }),
        }],
    });
    image.encode()
}

#[test]
fn test_inconsistent_code_is_malformed() {
    use dexir_image::{register_kind, InvokeType};

    // Result bound to a void call
    let bytes = broken_image(access::STATIC, vec![register_kind::REFERENCE], |pool| {
        let gc = pool.method("Ljava/lang/System;", "gc", "V", &[]);
        vec![
            Insn::Invoke {
                kind: InvokeType::Static,
                method: gc,
                args: vec![],
            },
            Insn::MoveResult { dst: 0 },
            Insn::ReturnVoid,
        ]
    });
    assert!(matches!(decode(&bytes), Err(IrError::MalformedImage(_))));

    // Reference result moved into an int register
    let bytes = broken_image(access::STATIC, vec![register_kind::INT], |pool| {
        let current = pool.method("Ljava/lang/Thread;", "currentThread", "Ljava/lang/Thread;", &[]);
        vec![
            Insn::Invoke {
                kind: InvokeType::Static,
                method: current,
                args: vec![],
            },
            Insn::MoveResult { dst: 0 },
            Insn::ReturnVoid,
        ]
    });
    assert!(matches!(decode(&bytes), Err(IrError::MalformedImage(_))));

    // Reference field loaded into an int register
    let bytes = broken_image(access::STATIC, vec![register_kind::INT], |pool| {
        let out = pool.field("Ljava/lang/System;", "out", "Ljava/io/PrintStream;");
        vec![Insn::StaticGet { dst: 0, field: out }, Insn::ReturnVoid]
    });
    assert!(matches!(decode(&bytes), Err(IrError::MalformedImage(_))));

    // Code on methods that cannot have any
    for flags in [access::PUBLIC | access::ABSTRACT, access::STATIC | access::NATIVE] {
        let bytes = broken_image(flags, vec![], |_| vec![Insn::ReturnVoid]);
        assert!(matches!(decode(&bytes), Err(IrError::MalformedImage(_))));
    }

    // One image calling the same method both ways
    let bytes = broken_image(access::STATIC, vec![register_kind::REFERENCE], |pool| {
        let yield_now = pool.method("Ljava/lang/Thread;", "yield", "V", &[]);
        vec![
            Insn::Invoke {
                kind: InvokeType::Static,
                method: yield_now,
                args: vec![],
            },
            Insn::Invoke {
                kind: InvokeType::Virtual,
                method: yield_now,
                args: vec![0],
            },
            Insn::ReturnVoid,
        ]
    });
    assert!(matches!(decode(&bytes), Err(IrError::MalformedImage(_))));
}

#[test]
fn test_encoder_refuses_code_falling_off_the_end() {
    let mut cp = Classpath::new();
    let main = cp
        .define_type(&TypeDescriptor::object("Main"), TypeDefinition::default())
        .unwrap();
    let run = cp.declare_method(main, "run", &void(), access::STATIC).unwrap();
    cp.create_body(run).unwrap();
    let ret = cp.append(run, Instruction::Return(None)).unwrap();
    cp.add_after(ret, Const::int(LocalVariable::int(), 1)).unwrap();

    assert!(matches!(encode(&cp), Err(IrError::InvalidBody(_))));
    let last = *cp.body(run).unwrap().instructions().last().unwrap();
    cp.remove(last).unwrap();
    assert!(decode(&encode(&cp).unwrap()).is_ok());
}

#[test]
fn test_duplicate_types() {
    let mut image = open_stream_image();
    let class = image.classes[0].clone();
    image.classes.push(class);
    assert!(matches!(
        decode(&image.encode()),
        Err(IrError::DuplicateType(_))
    ));

    let mut decoder = Decoder::new();
    decoder.add(&open_stream_bytes()).unwrap();
    assert!(matches!(
        decoder.add(&open_stream_bytes()),
        Err(IrError::DuplicateType(_))
    ));
}

#[test]
fn test_failed_decode_leaves_classpath_untouched() {
    let mut decoder = Decoder::new();
    decoder.add(&open_stream_bytes()).unwrap();
    let before = pretty::dump_classpath(decoder.classpath());
    let types_before = decoder.classpath().types().count();

    // A valid new class whose code calls openStream as a static method
    let mut pool = dexir_image::ConstantPoolBuilder::new();
    let class = pool.ty("LOther;");
    let go = pool.method("LOther;", "go", "V", &["Ljava/net/URL;".to_string()]);
    let open_stream = pool.method("Ljava/net/URL;", "openStream", "Ljava/io/InputStream;", &[]);
    let mut image = Image::new();
    image.constants = pool.build();
    image.classes.push(dexir_image::ClassDef {
        class,
        access: access::PUBLIC,
        superclass: None,
        interfaces: vec![],
        source_file: None,
        fields: vec![],
        methods: vec![dexir_image::MethodDef {
            method: go,
            access: access::STATIC,
            code: Some(dexir_image::CodeItem {
                registers_size: 1,
                ins_size: 1,
                register_kinds: vec![dexir_image::register_kind::REFERENCE],
                insns: vec![
                    Insn::Invoke {
                        kind: dexir_image::InvokeType::Static,
                        method: open_stream,
                        args: vec![],
                    },
                    Insn::ReturnVoid,
                ],
            }),
        }],
    });

    assert!(matches!(
        decoder.add_image(&image),
        Err(IrError::SignatureConflict(_))
    ));
    assert_eq!(pretty::dump_classpath(decoder.classpath()), before);
    assert_eq!(decoder.classpath().types().count(), types_before);
    let mut cp = decoder.finish();
    let other = cp.type_mirror(&TypeDescriptor::object("Other")).unwrap();
    assert!(!cp.ty(other).is_local());
}

#[test]
fn test_ignored_results_get_fresh_locals() {
    let mut image = open_stream_image();
    let code = image.classes[0].methods[0].code.as_mut().unwrap();
    code.insns.remove(1);

    let mut cp = decode(&image.encode()).unwrap();
    let open_stream = open_stream(&mut cp);
    let reference = cp.references(open_stream).list_all().next().unwrap();
    match cp.instruction(reference.instruction()) {
        Some(Instruction::Invoke(invoke)) => assert!(invoke.result().is_some()),
        other => panic!("expected invoke, got {:?}", other),
    }
}

#[test]
fn test_encoder_capacity_errors() {
    let cp = counter_classpath();

    let tight = |config: CodecConfig| Encoder::new(config).encode(&cp);
    assert!(matches!(
        tight(CodecConfig {
            max_registers: 4,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded {
            what: "registers",
            ..
        })
    ));
    assert!(matches!(
        tight(CodecConfig {
            max_instructions_per_method: 3,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded {
            what: "instructions per method",
            ..
        })
    ));
    assert!(matches!(
        tight(CodecConfig {
            max_invoke_arguments: 0,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded {
            what: "invoke arguments",
            ..
        })
    ));
    assert!(matches!(
        tight(CodecConfig {
            max_types: 2,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded { what: "types", .. })
    ));
    assert!(matches!(
        tight(CodecConfig {
            max_method_refs: 1,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded {
            what: "method references",
            ..
        })
    ));
    assert!(matches!(
        tight(CodecConfig {
            max_field_refs: 1,
            ..CodecConfig::default()
        }),
        Err(IrError::CapacityExceeded {
            what: "field references",
            ..
        })
    ));
}

#[test]
fn test_unresolved_member_blocks_encoding() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    let m = example_method(&mut cp);
    let system = cp
        .type_mirror(&TypeDescriptor::object("java/lang/System"))
        .unwrap();
    let nano = cp
        .method(
            system,
            "nanoTime",
            &MethodSignature::new(TypeDescriptor::Long, vec![]),
            TriState::Unknown,
        )
        .unwrap();
    let first = cp.body(m).unwrap().instructions()[0];
    let call = Invoke::builder()
        .method(nano)
        .return_value(LocalVariable::long())
        .build(&cp)
        .unwrap();
    cp.add_before(first, call).unwrap();

    assert!(matches!(encode(&cp), Err(IrError::UnresolvedSymbol(_))));
    cp.method(
        system,
        "nanoTime",
        &MethodSignature::new(TypeDescriptor::Long, vec![]),
        TriState::True,
    )
    .unwrap();
    let decoded = decode(&encode(&cp).unwrap()).unwrap();
    assert_eq!(decoded.local_types().count(), 1);
}
