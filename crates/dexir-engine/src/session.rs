//! Loading and saving images
//!
//! The free functions use default limits; [`Session`] carries a
//! [`CodecConfig`] for the same operations.

use crate::classpath::Classpath;
use crate::config::CodecConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::IrResult;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Codec settings shared by a sequence of loads and saves
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Encoder limits
    pub config: CodecConfig,
}

impl Session {
    /// Session with the given limits
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Session configured from a TOML file
    pub fn from_config_file(path: impl AsRef<Path>) -> IrResult<Self> {
        Ok(Self::new(CodecConfig::load(path)?))
    }

    /// Decode one image file
    pub fn load(&self, path: impl AsRef<Path>) -> IrResult<Classpath> {
        self.load_all([path])
    }

    /// Decode one image from a reader
    pub fn load_from(&self, mut reader: impl Read) -> IrResult<Classpath> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut decoder = Decoder::new();
        decoder.add(&bytes)?;
        info!(bytes = bytes.len(), "loaded image from reader");
        Ok(decoder.finish())
    }

    /// Decode several image files into one classpath
    ///
    /// Fails on the first file that does not decode.
    pub fn load_all<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> IrResult<Classpath> {
        let mut decoder = Decoder::new();
        for path in paths {
            let path = path.as_ref();
            let bytes = std::fs::read(path)?;
            decoder.add(&bytes)?;
            info!(path = %path.display(), bytes = bytes.len(), "loaded image");
        }
        Ok(decoder.finish())
    }

    /// Encode a classpath into a file
    pub fn save(&self, classpath: &Classpath, path: impl AsRef<Path>) -> IrResult<()> {
        let path = path.as_ref();
        let bytes = Encoder::new(self.config.clone()).encode(classpath)?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "saved image");
        Ok(())
    }

    /// Encode a classpath into a writer
    pub fn save_to(&self, classpath: &Classpath, mut writer: impl Write) -> IrResult<()> {
        let bytes = Encoder::new(self.config.clone()).encode(classpath)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        info!(bytes = bytes.len(), "saved image to writer");
        Ok(())
    }
}

/// Decode one image file
pub fn load(path: impl AsRef<Path>) -> IrResult<Classpath> {
    Session::default().load(path)
}

/// Decode one image from a reader
pub fn load_from(reader: impl Read) -> IrResult<Classpath> {
    Session::default().load_from(reader)
}

/// Decode several image files into one classpath
pub fn load_all<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> IrResult<Classpath> {
    Session::default().load_all(paths)
}

/// Encode a classpath into a file
pub fn save(classpath: &Classpath, path: impl AsRef<Path>) -> IrResult<()> {
    Session::default().save(classpath, path)
}

/// Encode a classpath into a writer
pub fn save_to(classpath: &Classpath, writer: impl Write) -> IrResult<()> {
    Session::default().save_to(classpath, writer)
}
