//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use dexir_engine::{
    Classpath, Const, InsnId, Invoke, LoadStore, LocalVariable, MethodId, MethodSignature,
    ReferenceKind, TriState, TypeDescriptor,
};
use dexir_image::{
    access, register_kind, ClassDef, CodeItem, ConstantPoolBuilder, Image, Insn, InvokeType,
    MethodDef,
};

pub fn url() -> TypeDescriptor {
    TypeDescriptor::object("java/net/URL")
}

pub fn string() -> TypeDescriptor {
    TypeDescriptor::object("java/lang/String")
}

pub fn string_builder() -> TypeDescriptor {
    TypeDescriptor::object("java/lang/StringBuilder")
}

pub fn print_stream() -> TypeDescriptor {
    TypeDescriptor::object("java/io/PrintStream")
}

pub fn open_stream_signature() -> MethodSignature {
    MethodSignature::new(TypeDescriptor::object("java/io/InputStream"), vec![])
}

pub fn println_signature() -> MethodSignature {
    MethodSignature::new(TypeDescriptor::Void, vec![string()])
}

/// `LExample;` with `static m(Ljava/net/URL;)V { url.openStream(); }`
pub fn open_stream_image() -> Image {
    let mut pool = ConstantPoolBuilder::new();
    let class = pool.ty("LExample;");
    let object = pool.ty("Ljava/lang/Object;");
    let source = pool.string("Example.java");
    let m = pool.method("LExample;", "m", "V", &["Ljava/net/URL;".to_string()]);
    let open_stream = pool.method("Ljava/net/URL;", "openStream", "Ljava/io/InputStream;", &[]);

    let mut image = Image::new();
    image.flags = dexir_image::flags::HAS_SOURCE_FILES;
    image.constants = pool.build();
    image.classes.push(ClassDef {
        class,
        access: access::PUBLIC,
        superclass: Some(object),
        interfaces: vec![],
        source_file: Some(source),
        fields: vec![],
        methods: vec![MethodDef {
            method: m,
            access: access::PUBLIC | access::STATIC,
            code: Some(CodeItem {
                registers_size: 2,
                ins_size: 1,
                register_kinds: vec![register_kind::REFERENCE, register_kind::REFERENCE],
                insns: vec![
                    Insn::Invoke {
                        kind: InvokeType::Virtual,
                        method: open_stream,
                        args: vec![1],
                    },
                    Insn::MoveResult { dst: 0 },
                    Insn::ReturnVoid,
                ],
            }),
        }],
    });
    image
}

pub fn open_stream_bytes() -> Vec<u8> {
    open_stream_image().encode()
}

pub fn example_method(cp: &mut Classpath) -> MethodId {
    let owner = cp.type_mirror(&TypeDescriptor::object("Example")).unwrap();
    let sig = MethodSignature::new(TypeDescriptor::Void, vec![url()]);
    cp.find_method(owner, "m", &sig).expect("m is declared")
}

pub fn open_stream(cp: &mut Classpath) -> MethodId {
    let owner = cp.type_mirror(&url()).unwrap();
    cp.method(owner, "openStream", &open_stream_signature(), TriState::False)
        .unwrap()
}

pub fn println(cp: &mut Classpath) -> MethodId {
    let owner = cp.type_mirror(&print_stream()).unwrap();
    cp.method(owner, "println", &println_signature(), TriState::False)
        .unwrap()
}

/// Log the URL before every `openStream` call:
///
/// ```text
/// sb = new StringBuilder()
/// msg = "opening "
/// sb1 = sb.append(msg)
/// sb2 = sb1.append(url)
/// text = sb2.toString()
/// out = System.out
/// out.println(text)
/// ```
///
/// Returns the id of the inserted `println` invoke.
pub fn instrument(cp: &mut Classpath) -> InsnId {
    let open_stream = open_stream(cp);
    let println = println(cp);

    let builder_ty = cp.type_mirror(&string_builder()).unwrap();
    let object = TypeDescriptor::object("java/lang/Object");
    let init = cp
        .method(
            builder_ty,
            "<init>",
            &MethodSignature::new(TypeDescriptor::Void, vec![]),
            TriState::False,
        )
        .unwrap();
    let append_string = cp
        .method(
            builder_ty,
            "append",
            &MethodSignature::new(string_builder(), vec![string()]),
            TriState::False,
        )
        .unwrap();
    let append_object = cp
        .method(
            builder_ty,
            "append",
            &MethodSignature::new(string_builder(), vec![object]),
            TriState::False,
        )
        .unwrap();
    let to_string = cp
        .method(
            builder_ty,
            "toString",
            &MethodSignature::new(string(), vec![]),
            TriState::False,
        )
        .unwrap();
    let system = cp
        .type_mirror(&TypeDescriptor::object("java/lang/System"))
        .unwrap();
    let out_field = cp
        .field(system, "out", &print_stream(), TriState::True)
        .unwrap();

    let anchor = cp
        .references(open_stream)
        .list_references(ReferenceKind::Invoke)
        .next()
        .expect("openStream is invoked")
        .instruction();
    let url_local = match cp.instruction(anchor) {
        Some(dexir_engine::Instruction::Invoke(invoke)) => invoke.parameters()[0],
        other => panic!("expected invoke, got {:?}", other),
    };

    let sb = LocalVariable::reference();
    let msg = LocalVariable::reference();
    let sb1 = LocalVariable::reference();
    let sb2 = LocalVariable::reference();
    let text = LocalVariable::reference();
    let out = LocalVariable::reference();

    let new_builder = Invoke::builder()
        .new_instance()
        .method(init)
        .return_value(sb)
        .build(cp)
        .unwrap();
    cp.add_before(anchor, new_builder).unwrap();
    cp.add_before(anchor, Const::string(msg, "opening ")).unwrap();
    let append = Invoke::builder()
        .method(append_string)
        .parameters([sb, msg])
        .return_value(sb1)
        .build(cp)
        .unwrap();
    cp.add_before(anchor, append).unwrap();
    let append = Invoke::builder()
        .method(append_object)
        .parameters([sb1, url_local])
        .return_value(sb2)
        .build(cp)
        .unwrap();
    cp.add_before(anchor, append).unwrap();
    let call = Invoke::builder()
        .method(to_string)
        .parameter(sb2)
        .return_value(text)
        .build(cp)
        .unwrap();
    cp.add_before(anchor, call).unwrap();
    let load = LoadStore::load().field(out_field).value(out).build(cp).unwrap();
    cp.add_before(anchor, load).unwrap();
    let call = Invoke::builder()
        .method(println)
        .parameters([out, text])
        .build(cp)
        .unwrap();
    cp.add_before(anchor, call).unwrap()
}
