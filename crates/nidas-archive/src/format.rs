// SPDX-License-Identifier: GPL-2.0-or-later

//! Archive wire format: `8-byte LE timetag, 4-byte LE id, 2-byte LE
//! type, 2-byte LE length, payload bytes`, with optional bzip2 wrapping detected by a `.bz2` file
//! suffix, and the fixed header sample every file opens with.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use nidas_core::error::{NidasError, Result};
use nidas_core::sample::{SampleId, SamplePool, SampleRef, SampleType, ARCHIVE_HEADER_ID};
use nidas_core::time::Time;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

fn type_code(t: SampleType) -> u16 {
    match t {
        SampleType::Byte => 0,
        SampleType::UByte => 1,
        SampleType::Int16 => 2,
        SampleType::UInt16 => 3,
        SampleType::Int32 => 4,
        SampleType::UInt32 => 5,
        SampleType::Int64 => 6,
        SampleType::Float32 => 7,
        SampleType::Float64 => 8,
        SampleType::Unknown => 0xffff,
    }
}

fn type_from_code(code: u16) -> SampleType {
    match code {
        0 => SampleType::Byte,
        1 => SampleType::UByte,
        2 => SampleType::Int16,
        3 => SampleType::UInt16,
        4 => SampleType::Int32,
        5 => SampleType::UInt32,
        6 => SampleType::Int64,
        7 => SampleType::Float32,
        8 => SampleType::Float64,
        _ => SampleType::Unknown,
    }
}

/// Serialize one sample onto `w` in archive wire format.
pub fn write_sample<W: Write>(w: &mut W, sample: &SampleRef) -> Result<()> {
    w.write_i64::<LittleEndian>(sample.timetag().usecs())
        .map_err(NidasError::Io)?;
    w.write_u32::<LittleEndian>(sample.id().raw())
        .map_err(NidasError::Io)?;
    w.write_u16::<LittleEndian>(type_code(sample.sample_type()))
        .map_err(NidasError::Io)?;
    let data = sample.data();
    w.write_u16::<LittleEndian>(data.len() as u16)
        .map_err(NidasError::Io)?;
    w.write_all(data).map_err(NidasError::Io)?;
    Ok(())
}

/// Read one sample from `r`. Returns `Ok(None)` on orderly EOF at a
/// record boundary, matching the original's `EndOfData`.
pub fn read_sample<R: Read>(r: &mut R, pool: &Arc<SamplePool>) -> Result<Option<SampleRef>> {
    let mut tt_buf = [0u8; 8];
    match r.read_exact(&mut tt_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(NidasError::Io(e)),
    }
    let tt = i64::from_le_bytes(tt_buf);
    let id = r.read_u32::<LittleEndian>().map_err(NidasError::Io)?;
    let typ = type_from_code(r.read_u16::<LittleEndian>().map_err(NidasError::Io)?);
    let len = r.read_u16::<LittleEndian>().map_err(NidasError::Io)? as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).map_err(NidasError::Io)?;

    let elem = typ.element_size().max(1);
    let n_elems = len / elem;
    let mut b = pool.allocate(typ, n_elems);
    b.set_timetag(Time::from_usecs(tt));
    b.set_id(SampleId(id));
    b.write_bytes(0, &payload);
    b.set_len(n_elems);
    Ok(Some(b.freeze()))
}

fn is_bz2(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("bz2")
}

/// Append to (or create) an archive file, transparently bzip2-wrapping
/// when `path` ends in `.bz2`.
pub fn open_writer(file: File, path: &Path) -> Box<dyn Write> {
    if is_bz2(path) {
        Box::new(BzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        Box::new(BufWriter::new(file))
    }
}

/// Open an archive file for reading, transparently un-bzip2-wrapping
/// when `path` ends in `.bz2`.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if is_bz2(path) {
        Ok(Box::new(BzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// The fixed header sample that precedes every archive file's stream:
/// archive format version, software version, project name,
/// platform name, and a configuration path. Encoded as NUL-separated
/// UTF-8 fields after a little-endian `u32` archive version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeaderFields {
    pub archive_version: u32,
    pub software_version: String,
    pub project_name: String,
    pub platform_name: String,
    pub config_path: String,
}

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

fn encode_header(fields: &ArchiveHeaderFields) -> Vec<u8> {
    let mut out = fields.archive_version.to_le_bytes().to_vec();
    let joined = [
        fields.software_version.as_str(),
        fields.project_name.as_str(),
        fields.platform_name.as_str(),
        fields.config_path.as_str(),
    ]
    .join("\0");
    out.extend_from_slice(joined.as_bytes());
    out
}

fn decode_header(bytes: &[u8]) -> Result<ArchiveHeaderFields> {
    if bytes.len() < 4 {
        return Err(NidasError::Parse("archive header sample truncated".into()));
    }
    let archive_version = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let text = String::from_utf8_lossy(&bytes[4..]);
    let mut parts = text.split('\0');
    let mut next = || parts.next().unwrap_or("").to_string();
    Ok(ArchiveHeaderFields {
        archive_version,
        software_version: next(),
        project_name: next(),
        platform_name: next(),
        config_path: next(),
    })
}

pub fn build_header_sample(pool: &Arc<SamplePool>, fields: &ArchiveHeaderFields, tt: Time) -> SampleRef {
    let bytes = encode_header(fields);
    let mut b = pool.allocate(SampleType::Byte, bytes.len());
    b.set_timetag(tt);
    b.set_id(SampleId(ARCHIVE_HEADER_ID));
    b.write_bytes(0, &bytes);
    b.set_len(bytes.len());
    b.freeze()
}

pub fn parse_header_sample(sample: &SampleRef) -> Result<ArchiveHeaderFields> {
    decode_header(sample.data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidas_core::sample::SamplePool;

    #[test]
    fn sample_round_trips_through_wire_format() {
        let pool = SamplePool::new();
        let mut b = pool.allocate(SampleType::Float32, 2);
        b.set_timetag(Time::from_usecs(12345));
        b.set_id(SampleId::new(1, 2, 3));
        b.write_bytes(0, &1.5f32.to_ne_bytes());
        b.write_bytes(4, &2.5f32.to_ne_bytes());
        b.set_len(2);
        let sample = b.freeze();

        let mut buf = Vec::new();
        write_sample(&mut buf, &sample).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let back = read_sample(&mut cursor, &pool).unwrap().unwrap();
        assert_eq!(back.timetag(), sample.timetag());
        assert_eq!(back.id(), sample.id());
        assert_eq!(back.as_f32(), vec![1.5, 2.5]);
        assert!(read_sample(&mut cursor, &pool).unwrap().is_none());
    }

    #[test]
    fn header_sample_round_trips() {
        let pool = SamplePool::new();
        let fields = ArchiveHeaderFields {
            archive_version: ARCHIVE_FORMAT_VERSION,
            software_version: "1.0.10".into(),
            project_name: "ISFS".into(),
            platform_name: "N1".into(),
            config_path: "/etc/nidas/default.xml".into(),
        };
        let sample = build_header_sample(&pool, &fields, Time::ZERO);
        let back = parse_header_sample(&sample).unwrap();
        assert_eq!(back, fields);
    }
}
