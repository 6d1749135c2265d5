//! The binary save-image cursor.
//!
//! A [`PersistStream`] owns one growable byte buffer per save or load
//! transaction. Saving appends; loading reads the whole file image up front
//! and walks it with a checked cursor, so a short or tampered file surfaces
//! as [`PersistError::Truncated`] instead of reading past the end.
//!
//! Every multi-byte integer is little-endian. Strings are u32
//! length-prefixed UTF-8. The image starts with a fixed header (magic,
//! format version, build tag, timestamp, description, optional thumbnail)
//! that [`peek_summary`] can read without touching the body — save-slot
//! menus list files that way.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::registry::ObjRef;
use crate::PersistError;

/// Bytes that prefix every save image.
pub const SAVE_MAGIC: [u8; 4] = *b"MRSV";

/// Format revision written by this build. Loading rejects a different major.
pub const FORMAT_MAJOR: u16 = 1;
pub const FORMAT_MINOR: u16 = 0;

/// Wire sentinel for an absent link or optional field.
const ABSENT: u32 = u32::MAX;

/// Header fields of a save image, readable without parsing the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub major: u16,
    pub minor: u16,
    pub build_tag: String,
    pub timestamp: u64,
    pub description: String,
    pub thumbnail: Option<Vec<u8>>,
}

/// Read just the header of a save image.
pub fn peek_summary(image: &[u8]) -> Result<SaveSummary, PersistError> {
    let mut cursor = Cursor {
        buf: image,
        offset: 0,
    };
    parse_header(&mut cursor)
}

/// One save or load transaction over an in-memory byte image.
#[derive(Debug)]
pub struct PersistStream {
    buf: Vec<u8>,
    offset: usize,
    saving: bool,
    summary: SaveSummary,
    links: HashMap<(u32, u32), ObjRef>,
}

impl PersistStream {
    /// Begin a save transaction. The header is written immediately; the
    /// thumbnail, when given, must be rendered before the transaction opens.
    pub fn for_save(description: &str, thumbnail: Option<Vec<u8>>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let summary = SaveSummary {
            major: FORMAT_MAJOR,
            minor: FORMAT_MINOR,
            build_tag: env!("CARGO_PKG_VERSION").to_string(),
            timestamp,
            description: description.to_string(),
            thumbnail,
        };

        let mut stream = PersistStream {
            buf: Vec::new(),
            offset: 0,
            saving: true,
            summary,
            links: HashMap::new(),
        };
        stream.write_header();
        stream
    }

    /// Begin a load transaction over a fully read file image. Validates the
    /// header and leaves the cursor at the start of the body.
    pub fn for_load(image: Vec<u8>) -> Result<Self, PersistError> {
        let (summary, body_start) = {
            let mut cursor = Cursor {
                buf: &image,
                offset: 0,
            };
            let summary = parse_header(&mut cursor)?;
            (summary, cursor.offset)
        };

        if summary.major != FORMAT_MAJOR {
            return Err(PersistError::Incompatible {
                found_major: summary.major,
                found_minor: summary.minor,
                expected_major: FORMAT_MAJOR,
            });
        }

        Ok(PersistStream {
            buf: image,
            offset: body_start,
            saving: false,
            summary,
            links: HashMap::new(),
        })
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn summary(&self) -> &SaveSummary {
        &self.summary
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Flush the whole image to disk. Writes a sibling temp file first and
    /// renames over the target, so a failed save leaves any previous file
    /// untouched.
    pub fn write_to(&self, path: &Path) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        let mut file = fs::File::create(tmp).map_err(io_err)?;
        file.write_all(&self.buf).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(tmp, path).map_err(io_err)
    }

    // --- raw cursor ---

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn get_bytes(&mut self, what: &'static str, len: usize) -> Result<&[u8], PersistError> {
        let start = self.offset;
        let end = start.checked_add(len).ok_or(PersistError::Truncated {
            what,
            offset: start,
        })?;
        if end > self.buf.len() {
            return Err(PersistError::Truncated {
                what,
                offset: start,
            });
        }
        self.offset = end;
        Ok(&self.buf[start..end])
    }

    pub fn skip(&mut self, what: &'static str, len: usize) -> Result<(), PersistError> {
        self.get_bytes(what, len).map(|_| ())
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn get_u8(&mut self, what: &'static str) -> Result<u8, PersistError> {
        Ok(self.get_bytes(what, 1)?[0])
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u16(&mut self, what: &'static str) -> Result<u16, PersistError> {
        Ok(LittleEndian::read_u16(self.get_bytes(what, 2)?))
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u32(&mut self, what: &'static str) -> Result<u32, PersistError> {
        Ok(LittleEndian::read_u32(self.get_bytes(what, 4)?))
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u64(&mut self, what: &'static str) -> Result<u64, PersistError> {
        Ok(LittleEndian::read_u64(self.get_bytes(what, 8)?))
    }

    pub fn put_string(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.put_bytes(value.as_bytes());
    }

    pub fn get_string(&mut self, what: &'static str) -> Result<String, PersistError> {
        let len = self.get_u32(what)? as usize;
        let bytes = self.get_bytes(what, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PersistError::InvalidString { what })
    }

    /// Reserve a u32 length slot; [`end_len`](Self::end_len) patches it with
    /// the byte count written since.
    pub(crate) fn begin_len(&mut self) -> usize {
        let mark = self.buf.len();
        self.put_u32(0);
        mark
    }

    pub(crate) fn end_len(&mut self, mark: usize) {
        let written = (self.buf.len() - mark - 4) as u32;
        self.buf[mark..mark + 4].copy_from_slice(&written.to_le_bytes());
    }

    // --- link table, installed by the registry during a load ---

    pub(crate) fn set_links(&mut self, links: HashMap<(u32, u32), ObjRef>) {
        self.links = links;
    }

    pub(crate) fn link_for(&self, class: u32, instance: u32) -> Option<ObjRef> {
        self.links.get(&(class, instance)).copied()
    }

    pub(crate) fn clear_links(&mut self) {
        self.links.clear();
    }

    // --- typed field transfer, one body for both directions ---

    pub fn transfer_u8(&mut self, name: &'static str, value: &mut u8) -> Result<(), PersistError> {
        if self.saving {
            self.put_u8(*value);
        } else {
            *value = self.get_u8(name)?;
        }
        Ok(())
    }

    pub fn transfer_u16(
        &mut self,
        name: &'static str,
        value: &mut u16,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u16(*value);
        } else {
            *value = self.get_u16(name)?;
        }
        Ok(())
    }

    pub fn transfer_u32(
        &mut self,
        name: &'static str,
        value: &mut u32,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u32(*value);
        } else {
            *value = self.get_u32(name)?;
        }
        Ok(())
    }

    pub fn transfer_i32(
        &mut self,
        name: &'static str,
        value: &mut i32,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u32(*value as u32);
        } else {
            *value = self.get_u32(name)? as i32;
        }
        Ok(())
    }

    pub fn transfer_u64(
        &mut self,
        name: &'static str,
        value: &mut u64,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u64(*value);
        } else {
            *value = self.get_u64(name)?;
        }
        Ok(())
    }

    pub fn transfer_bool(
        &mut self,
        name: &'static str,
        value: &mut bool,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u8(u8::from(*value));
        } else {
            *value = self.get_u8(name)? != 0;
        }
        Ok(())
    }

    pub fn transfer_f32(
        &mut self,
        name: &'static str,
        value: &mut f32,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u32(value.to_bits());
        } else {
            *value = f32::from_bits(self.get_u32(name)?);
        }
        Ok(())
    }

    pub fn transfer_f64(
        &mut self,
        name: &'static str,
        value: &mut f64,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u64(value.to_bits());
        } else {
            *value = f64::from_bits(self.get_u64(name)?);
        }
        Ok(())
    }

    pub fn transfer_string(
        &mut self,
        name: &'static str,
        value: &mut String,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_string(value);
        } else {
            *value = self.get_string(name)?;
        }
        Ok(())
    }

    pub fn transfer_opt_string(
        &mut self,
        name: &'static str,
        value: &mut Option<String>,
    ) -> Result<(), PersistError> {
        if self.saving {
            match value {
                Some(text) => self.put_string(text),
                None => self.put_u32(ABSENT),
            }
        } else {
            let len = self.get_u32(name)?;
            if len == ABSENT {
                *value = None;
            } else {
                let bytes = self.get_bytes(name, len as usize)?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| PersistError::InvalidString { what: name })?;
                *value = Some(text);
            }
        }
        Ok(())
    }

    pub fn transfer_bytes(
        &mut self,
        name: &'static str,
        value: &mut Vec<u8>,
    ) -> Result<(), PersistError> {
        if self.saving {
            self.put_u32(value.len() as u32);
            self.put_bytes(value);
        } else {
            let len = self.get_u32(name)? as usize;
            *value = self.get_bytes(name, len)?.to_vec();
        }
        Ok(())
    }

    /// Transfer a link to another registered object.
    ///
    /// Saving writes the handle's `(class, instance)` id pair; `None` writes
    /// a sentinel pair. Loading resolves the saved pair through the link
    /// table the registry installed during the table phase. A saved link
    /// whose target no longer exists loads as `None` with a warning —
    /// whether that is tolerable is the owning object's call.
    pub fn transfer_ref(
        &mut self,
        name: &'static str,
        value: &mut Option<ObjRef>,
    ) -> Result<(), PersistError> {
        if self.saving {
            match value {
                Some(handle) => {
                    self.put_u32(handle.class);
                    self.put_u32(handle.instance);
                }
                None => {
                    self.put_u32(ABSENT);
                    self.put_u32(ABSENT);
                }
            }
        } else {
            let class = self.get_u32(name)?;
            let instance = self.get_u32(name)?;
            if class == ABSENT && instance == ABSENT {
                *value = None;
            } else {
                *value = self.link_for(class, instance);
                if value.is_none() {
                    warn!("link {name} to saved instance {instance} of class {class} has no live target");
                }
            }
        }
        Ok(())
    }

    fn write_header(&mut self) {
        self.put_bytes(&SAVE_MAGIC);
        self.put_u16(self.summary.major);
        self.put_u16(self.summary.minor);
        let build_tag = self.summary.build_tag.clone();
        self.put_string(&build_tag);
        self.put_u64(self.summary.timestamp);
        let description = self.summary.description.clone();
        self.put_string(&description);
        match self.summary.thumbnail.clone() {
            Some(blob) => {
                self.put_u32(blob.len() as u32);
                self.put_bytes(&blob);
            }
            None => self.put_u32(ABSENT),
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, what: &'static str, len: usize) -> Result<&'a [u8], PersistError> {
        let start = self.offset;
        let end = start.checked_add(len).ok_or(PersistError::Truncated {
            what,
            offset: start,
        })?;
        if end > self.buf.len() {
            return Err(PersistError::Truncated {
                what,
                offset: start,
            });
        }
        self.offset = end;
        Ok(&self.buf[start..end])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, PersistError> {
        Ok(LittleEndian::read_u16(self.take(what, 2)?))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, PersistError> {
        Ok(LittleEndian::read_u32(self.take(what, 4)?))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, PersistError> {
        Ok(LittleEndian::read_u64(self.take(what, 8)?))
    }

    fn string(&mut self, what: &'static str) -> Result<String, PersistError> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(what, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PersistError::InvalidString { what })
    }
}

fn parse_header(cursor: &mut Cursor<'_>) -> Result<SaveSummary, PersistError> {
    let magic = cursor.take("save magic", 4)?;
    if magic != SAVE_MAGIC {
        return Err(PersistError::BadMagic);
    }

    let major = cursor.u16("format major version")?;
    let minor = cursor.u16("format minor version")?;
    let build_tag = cursor.string("build tag")?;
    let timestamp = cursor.u64("save timestamp")?;
    let description = cursor.string("save description")?;
    let thumbnail_len = cursor.u32("thumbnail length")?;
    let thumbnail = if thumbnail_len == ABSENT {
        None
    } else {
        Some(cursor.take("thumbnail", thumbnail_len as usize)?.to_vec())
    };

    Ok(SaveSummary {
        major,
        minor,
        build_tag,
        timestamp,
        description,
        thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_transfer_helper_round_trips() -> Result<(), PersistError> {
        let mut out = PersistStream::for_save("helper sweep", None);
        let mut a = 0xA5u8;
        let mut b = 0xBEEFu16;
        let mut c = 0xDEAD_BEEFu32;
        let mut d = -42i32;
        let mut e = 0x0123_4567_89AB_CDEFu64;
        let mut f = true;
        let mut g = 1.25f32;
        let mut h = -2.5f64;
        let mut i = String::from("calavera");
        let mut j = Some(String::from("rubacava"));
        let mut k: Option<String> = None;
        let mut l = vec![1u8, 2, 3, 4, 5];

        out.transfer_u8("a", &mut a)?;
        out.transfer_u16("b", &mut b)?;
        out.transfer_u32("c", &mut c)?;
        out.transfer_i32("d", &mut d)?;
        out.transfer_u64("e", &mut e)?;
        out.transfer_bool("f", &mut f)?;
        out.transfer_f32("g", &mut g)?;
        out.transfer_f64("h", &mut h)?;
        out.transfer_string("i", &mut i)?;
        out.transfer_opt_string("j", &mut j)?;
        out.transfer_opt_string("k", &mut k)?;
        out.transfer_bytes("l", &mut l)?;

        let mut back = PersistStream::for_load(out.into_bytes())?;
        assert!(!back.is_saving());
        assert_eq!(back.summary().description, "helper sweep");

        let mut a2 = 0u8;
        let mut b2 = 0u16;
        let mut c2 = 0u32;
        let mut d2 = 0i32;
        let mut e2 = 0u64;
        let mut f2 = false;
        let mut g2 = 0.0f32;
        let mut h2 = 0.0f64;
        let mut i2 = String::new();
        let mut j2: Option<String> = None;
        let mut k2 = Some(String::from("overwritten"));
        let mut l2 = Vec::new();

        back.transfer_u8("a", &mut a2)?;
        back.transfer_u16("b", &mut b2)?;
        back.transfer_u32("c", &mut c2)?;
        back.transfer_i32("d", &mut d2)?;
        back.transfer_u64("e", &mut e2)?;
        back.transfer_bool("f", &mut f2)?;
        back.transfer_f32("g", &mut g2)?;
        back.transfer_f64("h", &mut h2)?;
        back.transfer_string("i", &mut i2)?;
        back.transfer_opt_string("j", &mut j2)?;
        back.transfer_opt_string("k", &mut k2)?;
        back.transfer_bytes("l", &mut l2)?;

        assert_eq!(a2, 0xA5);
        assert_eq!(b2, 0xBEEF);
        assert_eq!(c2, 0xDEAD_BEEF);
        assert_eq!(d2, -42);
        assert_eq!(e2, 0x0123_4567_89AB_CDEF);
        assert!(f2);
        assert_eq!(g2, 1.25);
        assert_eq!(h2, -2.5);
        assert_eq!(i2, "calavera");
        assert_eq!(j2.as_deref(), Some("rubacava"));
        assert_eq!(k2, None);
        assert_eq!(l2, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn null_links_round_trip_without_a_table() -> Result<(), PersistError> {
        let mut out = PersistStream::for_save("null link", None);
        let mut link: Option<ObjRef> = None;
        out.transfer_ref("target", &mut link)?;

        let mut back = PersistStream::for_load(out.into_bytes())?;
        let mut loaded = Some(ObjRef {
            class: 7,
            instance: 9,
        });
        back.transfer_ref("target", &mut loaded)?;
        assert_eq!(loaded, None);
        Ok(())
    }

    #[test]
    fn dangling_link_degrades_to_none() -> Result<(), PersistError> {
        let mut out = PersistStream::for_save("dangling", None);
        let mut link = Some(ObjRef {
            class: 3,
            instance: 12,
        });
        out.transfer_ref("target", &mut link)?;

        // No link table installed: the saved pair has no live counterpart.
        let mut back = PersistStream::for_load(out.into_bytes())?;
        let mut loaded = Some(ObjRef {
            class: 0,
            instance: 0,
        });
        back.transfer_ref("target", &mut loaded)?;
        assert_eq!(loaded, None);
        Ok(())
    }

    #[test]
    fn truncated_image_is_a_reported_error() {
        let mut out = PersistStream::for_save("short", None);
        let mut value = 0x1122_3344u32;
        out.transfer_u32("value", &mut value).unwrap();

        let mut image = out.into_bytes();
        image.truncate(image.len() - 2);

        let mut back = PersistStream::for_load(image).unwrap();
        let mut loaded = 0u32;
        let err = back.transfer_u32("value", &mut loaded).unwrap_err();
        assert!(matches!(err, PersistError::Truncated { .. }));
    }

    #[test]
    fn major_version_mismatch_is_rejected() {
        let out = PersistStream::for_save("future", None);
        let mut image = out.into_bytes();
        // Major version lives right after the 4-byte magic.
        image[4] = 0xFF;
        image[5] = 0xFF;

        match PersistStream::for_load(image) {
            Err(PersistError::Incompatible { found_major, .. }) => {
                assert_eq!(found_major, 0xFFFF);
            }
            other => panic!("expected Incompatible, got {other:?}"),
        }
    }

    #[test]
    fn garbage_image_is_rejected_by_magic() {
        let err = PersistStream::for_load(vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, PersistError::BadMagic));
    }

    #[test]
    fn peek_summary_reads_header_only() -> Result<(), PersistError> {
        let mut out = PersistStream::for_save("slot 3", Some(vec![9, 9, 9]));
        let mut payload = 77u32;
        out.transfer_u32("payload", &mut payload)?;

        let image = out.into_bytes();
        let summary = peek_summary(&image)?;
        assert_eq!(summary.major, FORMAT_MAJOR);
        assert_eq!(summary.description, "slot 3");
        assert_eq!(summary.thumbnail.as_deref(), Some(&[9u8, 9, 9][..]));
        Ok(())
    }

    #[test]
    fn write_to_replaces_the_file_atomically() -> Result<(), PersistError> {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("slot0.sav");

        let first = PersistStream::for_save("first", None);
        first.write_to(&path)?;
        let second = PersistStream::for_save("second", None);
        second.write_to(&path)?;

        let image = std::fs::read(&path).expect("read save file");
        let summary = peek_summary(&image)?;
        assert_eq!(summary.description, "second");
        Ok(())
    }
}
