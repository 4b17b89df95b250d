//! Pack container format
//!
//! The payload uploaded to the spec cache when this client is elected
//! builder:
//!
//! ```text
//! u32 BE  MAGIC (0xC1A5700F)
//! repeat: u32 BE length, <length> payload bytes   (artifacts in name order)
//! u32 BE  END_OF_PACK (0x00000001)
//! ```
//!
//! Names are not transmitted; the receiver identifies artifacts by content.
//! Compression and encryption are layered on top by the writer passed in.

use crate::artifact::ArtifactSet;
use bytes::Bytes;
use std::io::{self, Write};

/// Leading magic marker
pub const MAGIC: u32 = 0xC1A5_700F;

/// Trailing end marker
pub const END_OF_PACK: u32 = 0x1;

/// Errors while writing or reading a pack
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Underlying writer failed
    #[error("pack io error: {0}")]
    Io(#[from] io::Error),

    /// Artifact too large for a 32-bit length prefix
    #[error("artifact '{name}' is too large to pack ({len} bytes)")]
    TooLarge { name: String, len: usize },

    /// Input does not start with the magic marker
    #[error("bad pack magic: {0:#010x}")]
    BadMagic(u32),

    /// Input ended inside a record or before the end marker
    #[error("truncated pack at offset {0}")]
    Truncated(usize),
}

/// Write `set` in pack format to `out`, returning the number of bytes written.
///
/// # Errors
/// Returns [`PackError::TooLarge`] for payloads over `u32::MAX` bytes and
/// [`PackError::Io`] if the writer fails.
pub fn write_pack<W: Write>(set: &ArtifactSet, out: &mut W) -> Result<u64, PackError> {
    let mut written = 0u64;
    out.write_all(&MAGIC.to_be_bytes())?;
    written += 4;

    for artifact in set {
        let len = u32::try_from(artifact.len()).map_err(|_| PackError::TooLarge {
            name: artifact.name().to_string(),
            len: artifact.len(),
        })?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(artifact.bytes())?;
        written += 4 + u64::from(len);
    }

    out.write_all(&END_OF_PACK.to_be_bytes())?;
    Ok(written + 4)
}

/// Read the payloads of a pack in stored order.
///
/// A length word equal to [`END_OF_PACK`] is the end marker only when it is
/// the final word of the input; otherwise it is a one-byte record.
///
/// # Errors
/// Returns [`PackError::BadMagic`] or [`PackError::Truncated`] on malformed input.
pub fn read_pack(data: &[u8]) -> Result<Vec<Bytes>, PackError> {
    let mut pos = 0usize;
    let magic = read_u32(data, &mut pos)?;
    if magic != MAGIC {
        return Err(PackError::BadMagic(magic));
    }

    let mut payloads = Vec::new();
    loop {
        let len = read_u32(data, &mut pos)?;
        if len == END_OF_PACK && pos == data.len() {
            return Ok(payloads);
        }
        let len = len as usize;
        let end = pos.checked_add(len).filter(|end| *end <= data.len());
        let Some(end) = end else {
            return Err(PackError::Truncated(pos));
        };
        payloads.push(Bytes::copy_from_slice(&data[pos..end]));
        pos = end;
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, PackError> {
    let word = data
        .get(*pos..*pos + 4)
        .ok_or(PackError::Truncated(*pos))?;
    *pos += 4;
    Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    fn set() -> ArtifactSet {
        vec![
            Artifact::new("b", vec![0xBB; 3]),
            Artifact::new("a", vec![0xAA; 2]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn layout_matches_wire_format() {
        let mut out = Vec::new();
        let n = write_pack(&set(), &mut out).unwrap();
        assert_eq!(n as usize, out.len());
        assert_eq!(
            out,
            vec![
                0xC1, 0xA5, 0x70, 0x0F, // magic
                0, 0, 0, 2, 0xAA, 0xAA, // "a"
                0, 0, 0, 3, 0xBB, 0xBB, 0xBB, // "b"
                0, 0, 0, 1, // end
            ]
        );
    }

    #[test]
    fn empty_set_is_magic_and_end() {
        let mut out = Vec::new();
        write_pack(&ArtifactSet::new(), &mut out).unwrap();
        assert_eq!(out, vec![0xC1, 0xA5, 0x70, 0x0F, 0, 0, 0, 1]);
        assert!(read_pack(&out).unwrap().is_empty());
    }

    #[test]
    fn one_byte_record_is_not_mistaken_for_end() {
        let set: ArtifactSet = vec![Artifact::new("x", vec![7u8])].into_iter().collect();
        let mut out = Vec::new();
        write_pack(&set, &mut out).unwrap();
        let payloads = read_pack(&out).unwrap();
        assert_eq!(payloads, vec![Bytes::from_static(&[7u8])]);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = read_pack(&[0, 0, 0, 0, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, PackError::BadMagic(0)));
    }

    #[test]
    fn rejects_truncated_record() {
        let err = read_pack(&[0xC1, 0xA5, 0x70, 0x0F, 0, 0, 0, 9, 1, 2]).unwrap_err();
        assert!(matches!(err, PackError::Truncated(8)));
    }
}
