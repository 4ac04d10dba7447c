//! C3: binary-safe encoding of [`FileInfo`] descriptors carried inside the
//! nominally-textual `ChatMessage::file_info` field (§6).
//!
//! Wire format, bit-exact across versions:
//! `{u16 version=1, u32 pathLen, path[pathLen], u32 typeLen, type[typeLen],
//!   u32 idLen, id[idLen], u8 status}`, hex-encoded lowercase with no
//! separators. Empty string is the "no attachment" sentinel.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::model::{FileInfo, FileStatus};

const VERSION: u16 = 1;

/// Serializes `info` to the versioned binary layout, then hex-encodes it.
pub fn encode(info: &FileInfo) -> String {
    let mut buf = Vec::new();
    buf.write_u16::<BigEndian>(VERSION).unwrap();
    write_field(&mut buf, info.file_path.as_bytes());
    write_field(&mut buf, info.file_type.as_bytes());
    write_field(&mut buf, info.file_id.as_bytes());
    buf.push(info.file_status.to_u8());
    hex::encode(buf)
}

fn write_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.write_u32::<BigEndian>(field.len() as u32).unwrap();
    buf.extend_from_slice(field);
}

/// Decodes a hex-encoded [`FileInfo`], or `Ok(None)` for the empty-string
/// "no attachment" sentinel. A non-empty string that fails to decode is a
/// programming error (§7): the codec signals it as [`Error::InvalidFileInfo`]
/// rather than silently substituting the sentinel, so callers can make it
/// fatal per the spec's error-kind taxonomy.
pub fn decode(hex_str: &str) -> Result<Option<FileInfo>> {
    if hex_str.is_empty() {
        return Ok(None);
    }

    let bytes = hex::decode(hex_str).map_err(|_| Error::InvalidFileInfo)?;
    let mut cursor = Cursor::new(bytes.as_slice());

    let version = cursor.read_u16::<BigEndian>().map_err(|_| Error::InvalidFileInfo)?;
    if version != VERSION {
        return Err(Error::InvalidFileInfo);
    }

    let file_path = read_field(&mut cursor)?;
    let file_type = read_field(&mut cursor)?;
    let file_id = read_field(&mut cursor)?;
    let status = cursor.read_u8().map_err(|_| Error::InvalidFileInfo)?;

    if cursor.position() as usize != bytes.len() {
        return Err(Error::InvalidFileInfo);
    }

    Ok(Some(FileInfo {
        file_path,
        file_type,
        file_id,
        file_status: FileStatus::from_u8(status)?,
    }))
}

fn read_field(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::InvalidFileInfo)? as usize;
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= cursor.get_ref().len())
        .ok_or(Error::InvalidFileInfo)?;
    let field = &cursor.get_ref()[start..end];
    cursor.set_position(end as u64);
    String::from_utf8(field.to_vec()).map_err(|_| Error::InvalidFileInfo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_string_is_no_attachment_sentinel() {
        assert_eq!(decode("").unwrap(), None);
    }

    #[test]
    fn garbage_hex_is_invalid_file_info() {
        match decode("zz") {
            Err(Error::InvalidFileInfo) => {}
            other => panic!("expected InvalidFileInfo, got {:?}", other),
        }
    }

    #[test]
    fn truncated_payload_is_invalid_file_info() {
        // valid version prefix, then nothing.
        match decode(&hex::encode(1u16.to_be_bytes())) {
            Err(Error::InvalidFileInfo) => {}
            other => panic!("expected InvalidFileInfo, got {:?}", other),
        }
    }

    fn arb_file_info() -> impl Strategy<Value = FileInfo> {
        (
            "[ -~]{0,40}",
            "[ -~]{0,20}",
            "[ -~]{0,40}",
            0u8..5,
        )
            .prop_map(|(file_path, file_type, file_id, status)| FileInfo {
                file_path,
                file_type,
                file_id,
                file_status: FileStatus::from_u8(status).unwrap(),
            })
    }

    proptest! {
        #[test]
        fn round_trip(info in arb_file_info()) {
            let encoded = encode(&info);
            let decoded = decode(&encoded).unwrap().unwrap();
            prop_assert_eq!(decoded, info);
        }
    }
}
