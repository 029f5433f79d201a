//! Preset files: a 4-byte magic followed by the plugin's program chunk.

use crate::error::{BridgeError, Result};
use ostinato_core::{ChunkKind, PluginBridge};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// `'XV3X'`, written little-endian.
pub const PRESET_MAGIC: u32 = u32::from_be_bytes(*b"XV3X");

pub fn write_preset<W: Write>(mut writer: W, chunk: &[u8]) -> Result<()> {
    writer.write_all(&PRESET_MAGIC.to_le_bytes())?;
    writer.write_all(chunk)?;
    writer.flush()?;
    Ok(())
}

pub fn read_preset<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => BridgeError::InvalidPreset("file shorter than magic".into()),
        _ => BridgeError::Io(e),
    })?;
    let magic = u32::from_le_bytes(magic);
    if magic != PRESET_MAGIC {
        return Err(BridgeError::InvalidPreset(format!("bad magic {magic:#010x}")));
    }
    let mut chunk = Vec::new();
    reader.read_to_end(&mut chunk)?;
    Ok(chunk)
}

/// Save the plugin's current program. Returns the chunk size.
pub fn save_program(plugin: &mut dyn PluginBridge, path: &Path) -> Result<usize> {
    let chunk = plugin.chunk(ChunkKind::Program);
    if chunk.is_empty() {
        return Err(BridgeError::StateSaveError("plugin returned an empty chunk".into()));
    }
    write_preset(BufWriter::new(File::create(path)?), &chunk)?;
    tracing::info!(path = %path.display(), bytes = chunk.len(), "saved preset");
    Ok(chunk.len())
}

/// Restore a program saved with [`save_program`]. Returns the chunk size.
pub fn load_program(plugin: &mut dyn PluginBridge, path: &Path) -> Result<usize> {
    let chunk = read_preset(BufReader::new(File::open(path)?))?;
    plugin.set_chunk(ChunkKind::Program, &chunk);
    tracing::info!(path = %path.display(), bytes = chunk.len(), "loaded preset");
    Ok(chunk.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_on_disk() {
        let mut out = Vec::new();
        write_preset(&mut out, &[1, 2, 3]).unwrap();
        assert_eq!(&out[..4], b"X3VX");
        assert_eq!(&out[4..], &[1, 2, 3]);
    }

    #[test]
    fn test_read_back() {
        let mut out = Vec::new();
        write_preset(&mut out, b"state").unwrap();
        assert_eq!(read_preset(out.as_slice()).unwrap(), b"state");
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = read_preset(&b"VSTPdata"[..]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPreset(_)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let err = read_preset(&b"X3"[..]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPreset(_)));
    }

    #[test]
    fn test_empty_chunk_after_magic() {
        assert!(read_preset(&b"X3VX"[..]).unwrap().is_empty());
    }
}
