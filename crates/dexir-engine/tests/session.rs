//! Loading and saving through the filesystem

mod common;

use common::*;
use dexir_engine::{pretty, session, CodecConfig, IrError, Session};
use dexir_image::Image;
use std::io::Cursor;
use tempfile::TempDir;

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("example.dxir");
    std::fs::write(&input, open_stream_bytes()).unwrap();

    let mut cp = session::load(&input).unwrap();
    instrument(&mut cp);

    let output = dir.path().join("instrumented.dxir");
    session::save(&cp, &output).unwrap();
    let reloaded = session::load(&output).unwrap();
    assert_eq!(pretty::dump_classpath(&reloaded), pretty::dump_classpath(&cp));

    let bytes = std::fs::read(&output).unwrap();
    assert!(Image::signature_hex(&bytes).is_some());
}

#[test]
fn test_reader_and_writer() {
    let cp = session::load_from(Cursor::new(open_stream_bytes())).unwrap();
    let mut buffer = Vec::new();
    session::save_to(&cp, &mut buffer).unwrap();
    let again = session::load_from(buffer.as_slice()).unwrap();
    assert_eq!(pretty::dump_classpath(&again), pretty::dump_classpath(&cp));
}

#[test]
fn test_load_all_merges_images() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.dxir");
    std::fs::write(&first, open_stream_bytes()).unwrap();

    // Same class under another name
    let mut image = open_stream_image();
    let name = image.constants.types[image.classes[0].class as usize] as usize;
    image.constants.strings[name] = "LOther;".to_string();
    let second = dir.path().join("second.dxir");
    std::fs::write(&second, image.encode()).unwrap();

    let mut cp = session::load_all([&first, &second]).unwrap();
    assert_eq!(cp.local_types().count(), 2);
    let open_stream = open_stream(&mut cp);
    assert_eq!(cp.references(open_stream).len(), 2);

    // The same file twice defines its class twice
    assert!(matches!(
        session::load_all([&first, &first]),
        Err(IrError::DuplicateType(_))
    ));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        session::load("/nonexistent/example.dxir"),
        Err(IrError::Io(_))
    ));
}

#[test]
fn test_session_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("dexir.toml");
    std::fs::write(&config_path, "max_registers = 1\n").unwrap();

    let session = Session::from_config_file(&config_path).unwrap();
    assert_eq!(session.config.max_registers, 1);
    let cp = session.load_from(open_stream_bytes().as_slice()).unwrap();
    assert!(matches!(
        session.save(&cp, dir.path().join("out.dxir")),
        Err(IrError::CapacityExceeded {
            what: "registers",
            ..
        })
    ));
    assert!(!dir.path().join("out.dxir").exists());

    std::fs::write(&config_path, "max_invoke_arguments = 1000\n").unwrap();
    assert!(matches!(
        Session::from_config_file(&config_path),
        Err(IrError::Config(_))
    ));
    assert!(Session::new(CodecConfig::default()).save_to(&cp, Vec::new()).is_ok());
}
