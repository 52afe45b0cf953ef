//! GP7+ archive handling (spec §4.6): locate the end-of-central-directory
//! record by scanning backwards, walk the central directory to find
//! `Content/score.gpif`, then decode its local file header payload.
//!
//! No zip crate appears anywhere in the retrieval pack, so this follows the
//! same "hand-roll the container walk with `ByteCursor`" approach the
//! teacher's `gpx/mod.rs` uses for BCFS, generalised to the standard
//! archive layout instead of the proprietary sector VFS.

use byteorder::{ByteOrder, LittleEndian};

use crate::cursor::ByteCursor;
use crate::error::{Error, ErrorKind, Result};
use crate::inflate;
use crate::limits::DecodeLimits;

const EOCD_MAGIC: u32 = 0x0605_4B50;
const CENTRAL_DIR_MAGIC: u32 = 0x0201_4B50;
const LOCAL_HEADER_MAGIC: u32 = 0x0403_4B50;
const TARGET_ENTRY: &str = "Content/score.gpif";

struct CentralDirEntry {
    name: String,
    method: u16,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

fn find_eocd_offset(data: &[u8]) -> Result<usize> {
    if data.len() < 22 {
        return Err(Error::from(ErrorKind::BadContainer(
            "archive shorter than an end-of-central-directory record".to_string(),
        )));
    }
    // The comment field can push the EOCD record anywhere in the last 64KiB
    // + 22 bytes; scan backwards for the magic.
    let earliest = data.len().saturating_sub(22 + 0xFFFF);
    let mut i = data.len() - 4;
    loop {
        if LittleEndian::read_u32(&data[i..i + 4]) == EOCD_MAGIC {
            return Ok(i);
        }
        if i == earliest {
            break;
        }
        i -= 1;
    }
    Err(Error::from(ErrorKind::BadHeader(
        "no end-of-central-directory record found".to_string(),
    )))
}

fn read_central_directory(data: &[u8], limits: &DecodeLimits) -> Result<Vec<CentralDirEntry>> {
    let eocd = find_eocd_offset(data)?;
    let mut eocd_cursor = ByteCursor::new(&data[eocd..]);
    eocd_cursor.skip(4)?; // magic
    eocd_cursor.skip(2 + 2 + 2)?; // disk number, disk-with-cd, entries-on-this-disk
    let total_entries = eocd_cursor.read_u16()? as usize;
    eocd_cursor.skip(4)?; // central directory size
    let cd_offset = eocd_cursor.read_u32()? as usize;

    if total_entries > limits.max_track_count as usize * 64 {
        return Err(Error::from(ErrorKind::BadContainer(
            "central directory entry count exceeds limit".to_string(),
        )));
    }
    if cd_offset >= data.len() {
        return Err(Error::from(ErrorKind::BadContainer(
            "central directory offset out of range".to_string(),
        )));
    }

    let mut cursor = ByteCursor::new(&data[cd_offset..]);
    let mut entries = Vec::with_capacity(total_entries);
    for _ in 0..total_entries {
        let magic = cursor.read_u32()?;
        if magic != CENTRAL_DIR_MAGIC {
            return Err(Error::from(ErrorKind::BadHeader(
                "central directory entry magic mismatch".to_string(),
            )));
        }
        cursor.skip(2 + 2)?; // version made by, version needed
        cursor.skip(2)?; // general purpose bit flag
        let method = cursor.read_u16()?;
        cursor.skip(2 + 2)?; // mod time, mod date
        cursor.skip(4)?; // crc32
        let compressed_size = cursor.read_u32()?;
        let uncompressed_size = cursor.read_u32()?;
        let name_len = cursor.read_u16()? as usize;
        let extra_len = cursor.read_u16()? as usize;
        let comment_len = cursor.read_u16()? as usize;
        cursor.skip(2 + 2)?; // disk number start, internal attributes
        cursor.skip(4)?; // external attributes
        let local_header_offset = cursor.read_u32()?;
        let name_bytes = cursor.read_bytes(name_len)?;
        let name = String::from_utf8_lossy(name_bytes).to_string();
        cursor.skip(extra_len)?;
        cursor.skip(comment_len)?;

        entries.push(CentralDirEntry {
            name,
            method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
    }
    Ok(entries)
}

/// Verifies the local file header and returns the entry's raw payload slice.
fn read_local_payload<'a>(data: &'a [u8], entry: &CentralDirEntry) -> Result<&'a [u8]> {
    let offset = entry.local_header_offset as usize;
    if offset + 30 > data.len() {
        return Err(Error::from(ErrorKind::Truncated));
    }
    let mut cursor = ByteCursor::new(&data[offset..]);
    let magic = cursor.read_u32()?;
    if magic != LOCAL_HEADER_MAGIC {
        return Err(Error::from(ErrorKind::BadHeader(
            "local file header magic mismatch".to_string(),
        )));
    }
    cursor.skip(2 + 2 + 2)?; // version needed, flags, method (already known)
    cursor.skip(2 + 2)?; // mod time, mod date
    cursor.skip(4)?; // crc32
    cursor.skip(4 + 4)?; // compressed size, uncompressed size (already known)
    let name_len = cursor.read_u16()? as usize;
    let extra_len = cursor.read_u16()? as usize;
    cursor.skip(name_len + extra_len)?;

    let payload_start = offset + 30 + name_len + extra_len;
    let payload_end = payload_start + entry.compressed_size as usize;
    if payload_end > data.len() {
        return Err(Error::from(ErrorKind::Truncated));
    }
    Ok(&data[payload_start..payload_end])
}

/// Decodes a GP7+ archive into the `Content/score.gpif` text it wraps.
pub fn extract_gpif(data: &[u8], limits: &DecodeLimits) -> Result<String> {
    let entries = read_central_directory(data, limits)?;
    debug!("Central directory has {} entries", entries.len());
    let entry = entries
        .iter()
        .find(|e| e.name == TARGET_ENTRY)
        .ok_or_else(|| Error::from(ErrorKind::BadContainer(format!("archive has no {}", TARGET_ENTRY))))?;
    debug!("Found {}, method {}, uncompressed size {}", TARGET_ENTRY, entry.method, entry.uncompressed_size);

    let payload = read_local_payload(data, entry)?;
    let bytes = match entry.method {
        0 => payload.to_vec(),
        8 => inflate::inflate(payload, entry.uncompressed_size as usize, limits)?,
        other => return Err(Error::from(ErrorKind::UnsupportedCompression(other))),
    };
    String::from_utf8(bytes).map_err(|e| Error::from(ErrorKind::BadContainer(format!("score.gpif is not valid utf-8: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn build_stored_archive(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let local_header_offset = 0u32;

        push_u32(&mut buf, LOCAL_HEADER_MAGIC);
        push_u16(&mut buf, 20); // version needed
        push_u16(&mut buf, 0); // flags
        push_u16(&mut buf, 0); // method: stored
        push_u16(&mut buf, 0); // mod time
        push_u16(&mut buf, 0); // mod date
        push_u32(&mut buf, 0); // crc32
        push_u32(&mut buf, payload.len() as u32); // compressed size
        push_u32(&mut buf, payload.len() as u32); // uncompressed size
        push_u16(&mut buf, name.len() as u16);
        push_u16(&mut buf, 0); // extra len
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(payload);

        let cd_offset = buf.len() as u32;
        push_u32(&mut buf, CENTRAL_DIR_MAGIC);
        push_u16(&mut buf, 20); // version made by
        push_u16(&mut buf, 20); // version needed
        push_u16(&mut buf, 0); // flags
        push_u16(&mut buf, 0); // method
        push_u16(&mut buf, 0); // mod time
        push_u16(&mut buf, 0); // mod date
        push_u32(&mut buf, 0); // crc32
        push_u32(&mut buf, payload.len() as u32);
        push_u32(&mut buf, payload.len() as u32);
        push_u16(&mut buf, name.len() as u16);
        push_u16(&mut buf, 0); // extra len
        push_u16(&mut buf, 0); // comment len
        push_u16(&mut buf, 0); // disk number start
        push_u16(&mut buf, 0); // internal attrs
        push_u32(&mut buf, 0); // external attrs
        push_u32(&mut buf, local_header_offset);
        buf.extend_from_slice(name.as_bytes());
        let cd_size = buf.len() as u32 - cd_offset;

        push_u32(&mut buf, EOCD_MAGIC);
        push_u16(&mut buf, 0); // disk number
        push_u16(&mut buf, 0); // disk with cd
        push_u16(&mut buf, 1); // entries on this disk
        push_u16(&mut buf, 1); // total entries
        push_u32(&mut buf, cd_size);
        push_u32(&mut buf, cd_offset);
        push_u16(&mut buf, 0); // comment length

        buf
    }

    #[test]
    fn extracts_stored_score_gpif() {
        let gpif = b"<GPIF><Score/></GPIF>";
        let archive = build_stored_archive(TARGET_ENTRY, gpif);
        let text = extract_gpif(&archive, &DecodeLimits::default()).unwrap();
        assert_eq!(text, String::from_utf8_lossy(gpif));
    }

    #[test]
    fn missing_entry_is_bad_container() {
        let archive = build_stored_archive("Content/other.xml", b"ignored");
        let err = extract_gpif(&archive, &DecodeLimits::default()).unwrap_err();
        assert!(err.to_string().contains("score.gpif"));
    }

    #[test]
    fn find_eocd_offset_scans_backwards_past_comment() {
        let mut archive = build_stored_archive(TARGET_ENTRY, b"x");
        let eocd_pos = archive.len() - 22;
        // Rewrite the comment-length field to claim a trailing comment, and
        // append the comment bytes, to prove the scan isn't fooled by trailing
        // garbage after the record it's looking for.
        LittleEndian::write_u16(&mut archive[eocd_pos + 20..eocd_pos + 22], 3);
        archive.extend_from_slice(b"hi!");
        assert_eq!(find_eocd_offset(&archive).unwrap(), eocd_pos);
    }
}
