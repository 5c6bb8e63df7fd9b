//! Instrumenting `openStream` call sites and re-encoding

mod common;

use common::*;
use dexir_engine::{
    decode, encode, pretty, Classpath, Instruction, InvokeKind, ReferenceKind,
};

fn invoke_kind(cp: &Classpath, id: dexir_engine::InsnId) -> Option<InvokeKind> {
    match cp.instruction(id) {
        Some(Instruction::Invoke(invoke)) => Some(invoke.kind()),
        _ => None,
    }
}

#[test]
fn test_decoded_reference_index() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    let open_stream = open_stream(&mut cp);
    let refs: Vec<_> = cp
        .references(open_stream)
        .list_references(ReferenceKind::Invoke)
        .collect();
    assert_eq!(refs.len(), 1);

    let m = example_method(&mut cp);
    let body = cp.body(m).unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body.instructions()[0], refs[0].instruction());
    assert_eq!(cp.method_of(refs[0].instruction()), Some(m));
}

#[test]
fn test_open_stream_scenario() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    let println_call = instrument(&mut cp);

    let println = println(&mut cp);
    let open_stream = open_stream(&mut cp);
    assert_eq!(cp.references(println).len(), 1);
    assert_eq!(
        cp.references(println).list_all().next().unwrap().instruction(),
        println_call
    );
    assert_eq!(cp.references(open_stream).count(ReferenceKind::Invoke), 1);

    let bytes = encode(&cp).unwrap();
    let mut decoded = decode(&bytes).unwrap();

    let m = example_method(&mut decoded);
    let body = decoded.body(m).unwrap().instructions().to_vec();
    assert_eq!(body.len(), 9);
    assert_eq!(invoke_kind(&decoded, body[0]), Some(InvokeKind::NewInstance));
    assert!(matches!(decoded.instruction(body[1]), Some(Instruction::Const(_))));
    assert!(matches!(decoded.instruction(body[5]), Some(Instruction::LoadStore(_))));
    assert!(matches!(decoded.instruction(body[8]), Some(Instruction::Return(None))));

    let println = common::println(&mut decoded);
    let open_stream = common::open_stream(&mut decoded);
    let println_refs: Vec<_> = decoded
        .references(println)
        .list_references(ReferenceKind::Invoke)
        .collect();
    let open_refs: Vec<_> = decoded
        .references(open_stream)
        .list_references(ReferenceKind::Invoke)
        .collect();
    assert_eq!(println_refs.len(), 1);
    assert_eq!(open_refs.len(), 1);
    assert_eq!(println_refs[0].instruction(), body[6]);
    assert_eq!(open_refs[0].instruction(), body[7]);

    // The decoded classpath prints exactly like the instrumented one
    assert_eq!(pretty::dump_classpath(&decoded), pretty::dump_classpath(&cp));
}

#[test]
fn test_detach_scenario() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    let println_call = instrument(&mut cp);
    let m = example_method(&mut cp);
    let println = println(&mut cp);

    let before: Vec<_> = cp
        .body(m)
        .unwrap()
        .instructions()
        .iter()
        .copied()
        .filter(|&id| id != println_call)
        .collect();

    let removed = cp.remove(println_call).unwrap();
    assert!(matches!(removed, Instruction::Invoke(_)));
    assert!(cp.references(println).is_empty());
    assert_eq!(cp.instruction(println_call), None);
    assert_eq!(cp.body(m).unwrap().instructions(), before.as_slice());

    // The detached value attaches again and is indexed under a new id
    let last = *before.last().unwrap();
    let again = cp.add_before(last, removed).unwrap();
    assert_ne!(again, println_call);
    assert_eq!(cp.references(println).len(), 1);
    assert_eq!(
        cp.references(println).list_all().next().unwrap().instruction(),
        again
    );
}

#[test]
fn test_new_instance_references_type_and_constructor() {
    let mut cp = decode(&open_stream_bytes()).unwrap();
    instrument(&mut cp);

    let builder = cp.type_mirror(&string_builder()).unwrap();
    let init = cp
        .find_method(
            builder,
            "<init>",
            &dexir_engine::MethodSignature::new(dexir_engine::TypeDescriptor::Void, vec![]),
        )
        .unwrap();
    assert_eq!(cp.references(builder).count(ReferenceKind::NewInstance), 1);
    assert_eq!(cp.references(init).count(ReferenceKind::NewInstance), 1);
    assert_eq!(cp.references(init).count(ReferenceKind::Invoke), 0);
}
