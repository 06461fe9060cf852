//! C6: bit-stable serialization of a cache entry to a byte string, used
//! only by non-in-memory storage backends (spec.md §6 "Persisted state
//! layout").
//!
//! Layout: magic, storage key, instants as 64-bit millis, status code,
//! method, URI, headers as length-prefixed name/value pairs, body bytes
//! (or a zero-length marker), then the variant map. Every string is
//! length-prefixed UTF-8; every length is a 32-bit unsigned integer in
//! network byte order. Header names starting with the reserved prefix
//! `hc-` are percent-escaped so they can never collide with internal
//! pseudo-headers a future serializer revision might introduce.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::entry::{CacheEntry, EntryCommon, ResourceEntry, VariantRoot};
use crate::error::{CacheError, Result};
use crate::headers::HeaderList;
use crate::resource::Resource;

const MAGIC: &[u8; 4] = b"HCE1";
const TAG_RESOURCE: u8 = 0;
const TAG_VARIANT_ROOT: u8 = 1;

const RESERVED_PREFIX: &str = "hc-";
const PREFIX_ESCAPE: &AsciiSet = &CONTROLS.add(b'-').add(b'%');

/// Serializes `entry` for storage under `storage_key`. The key is
/// embedded in the payload so a reader can self-check it (spec.md §4.6).
pub fn serialize(storage_key: &str, entry: &CacheEntry) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_string(&mut out, storage_key);
    match entry {
        CacheEntry::Resource(r) => {
            out.push(TAG_RESOURCE);
            write_common(&mut out, &r.common);
            write_resource(&mut out, r.resource.as_ref());
            write_u32(&mut out, 0);
        }
        CacheEntry::VariantRoot(v) => {
            out.push(TAG_VARIANT_ROOT);
            write_common(&mut out, &v.common);
            write_u32(&mut out, 0);
            write_variants(&mut out, &v.variants);
        }
    }
    out
}

/// Deserializes a payload previously produced by [`serialize`], verifying
/// it was written under `expected_key`. A key mismatch or any structural
/// corruption is reported as [`CacheError::EntrySerialization`]; callers
/// treat that as a miss, not a hard error (spec.md §4.6, §7).
pub fn deserialize(expected_key: &str, bytes: &[u8]) -> Result<CacheEntry> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let magic = cursor.take(4).map_err(|_| corrupt(expected_key, "truncated magic"))?;
    if magic != MAGIC.as_slice() {
        return Err(corrupt(expected_key, "bad magic"));
    }
    let key = cursor.read_string().map_err(|_| corrupt(expected_key, "truncated key"))?;
    if key != expected_key {
        return Err(corrupt(expected_key, "storage key mismatch"));
    }
    let tag = cursor.take(1).map_err(|_| corrupt(expected_key, "truncated tag"))?[0];
    let common = read_common(&mut cursor).map_err(|_| corrupt(expected_key, "truncated header block"))?;
    match tag {
        TAG_RESOURCE => {
            let resource = read_resource(&mut cursor).map_err(|_| corrupt(expected_key, "truncated body"))?;
            let _variant_count = cursor.read_u32().map_err(|_| corrupt(expected_key, "truncated variant map"))?;
            Ok(CacheEntry::Resource(ResourceEntry { common, resource }))
        }
        TAG_VARIANT_ROOT => {
            let _body_len = cursor.read_u32().map_err(|_| corrupt(expected_key, "truncated zero marker"))?;
            let variants = read_variants(&mut cursor).map_err(|_| corrupt(expected_key, "truncated variant map"))?;
            if variants.is_empty() {
                return Err(corrupt(expected_key, "variant root with no variants"));
            }
            Ok(CacheEntry::VariantRoot(VariantRoot { common, variants }))
        }
        _ => Err(corrupt(expected_key, "unknown entry tag")),
    }
}

fn corrupt(key: &str, reason: &str) -> CacheError {
    CacheError::EntrySerialization { key: key.to_string(), reason: reason.to_string() }
}

fn write_common(out: &mut Vec<u8>, common: &EntryCommon) {
    write_millis(out, common.request_instant);
    write_millis(out, common.response_instant);
    write_u32(out, common.status_code as u32);
    write_string(out, common.request_method.as_deref().unwrap_or(""));
    write_string(out, &common.request_uri);
    write_headers(out, &common.headers);
}

fn read_common(cursor: &mut Cursor) -> std::result::Result<EntryCommon, ()> {
    let request_instant = read_millis(cursor)?;
    let response_instant = read_millis(cursor)?;
    let status_code = cursor.read_u32()? as u16;
    let method = cursor.read_string()?;
    let request_uri = cursor.read_string()?;
    let headers = read_headers(cursor)?;
    Ok(EntryCommon {
        request_instant,
        response_instant,
        status_code,
        headers,
        request_method: if method.is_empty() { None } else { Some(method) },
        request_uri,
    })
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderList) {
    let pairs = headers.as_pairs();
    write_u32(out, pairs.len() as u32);
    for (name, value) in pairs {
        write_string(out, &escape_reserved(name));
        write_string(out, value);
    }
}

fn read_headers(cursor: &mut Cursor) -> std::result::Result<HeaderList, ()> {
    let count = cursor.read_u32()?;
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = unescape_reserved(&cursor.read_string()?);
        let value = cursor.read_string()?;
        pairs.push((name, value));
    }
    Ok(HeaderList::from_pairs(pairs))
}

fn escape_reserved(name: &str) -> String {
    if name.to_ascii_lowercase().starts_with(RESERVED_PREFIX) {
        utf8_percent_encode(name, PREFIX_ESCAPE).to_string()
    } else {
        name.to_string()
    }
}

fn unescape_reserved(name: &str) -> String {
    percent_decode_str(name).decode_utf8_lossy().into_owned()
}

fn write_resource(out: &mut Vec<u8>, resource: Option<&Resource>) {
    match resource.and_then(Resource::as_bytes) {
        Some(bytes) => {
            write_u32(out, bytes.len() as u32);
            out.extend_from_slice(bytes);
        }
        None => write_u32(out, 0),
    }
}

fn read_resource(cursor: &mut Cursor) -> std::result::Result<Option<Resource>, ()> {
    let len = cursor.read_u32()? as usize;
    if len == 0 {
        return Ok(None);
    }
    let bytes = cursor.take(len)?;
    Ok(Some(Resource::from_bytes(bytes.to_vec())))
}

fn write_variants(out: &mut Vec<u8>, variants: &BTreeMap<String, String>) {
    write_u32(out, variants.len() as u32);
    for (variant_key, storage_key) in variants {
        write_string(out, variant_key);
        write_string(out, storage_key);
    }
}

fn read_variants(cursor: &mut Cursor) -> std::result::Result<BTreeMap<String, String>, ()> {
    let count = cursor.read_u32()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let k = cursor.read_string()?;
        let v = cursor.read_string()?;
        map.insert(k, v);
    }
    Ok(map)
}

fn write_millis(out: &mut Vec<u8>, instant: SystemTime) {
    let millis = instant.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    out.extend_from_slice(&millis.to_be_bytes());
}

fn read_millis(cursor: &mut Cursor) -> std::result::Result<SystemTime, ()> {
    let bytes = cursor.take(8)?;
    let millis = u64::from_be_bytes(bytes.try_into().map_err(|_| ())?);
    Ok(UNIX_EPOCH + Duration::from_millis(millis))
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], ()> {
        if self.pos + len > self.bytes.len() {
            return Err(());
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> std::result::Result<u32, ()> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().map_err(|_| ())?))
    }

    fn read_string(&mut self) -> std::result::Result<String, ()> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ())
    }
}
