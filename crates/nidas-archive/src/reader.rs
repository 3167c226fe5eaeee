// SPDX-License-Identifier: GPL-2.0-or-later

//! Archive reader: enumerates the File Set's matching files for a time
//! range, then iterates their samples in order, skipping each file's
//! leading header sample.

use crate::fileset::{self, FileSetConfig};
use crate::format;
use nidas_core::error::{NidasError, Result};
use nidas_core::sample::{SamplePool, SampleRef, ARCHIVE_HEADER_ID};
use nidas_core::time::Time;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ArchiveReader {
    pool: Arc<SamplePool>,
    files: Vec<PathBuf>,
    file_index: usize,
    current: Option<Box<dyn Read>>,
    pending: Option<SampleRef>,
}

impl ArchiveReader {
    pub fn open(config: &FileSetConfig, pool: Arc<SamplePool>, start: Time, end: Time) -> Result<Self> {
        let files = fileset::enumerate(config, start, end).map_err(NidasError::Io)?;
        Ok(ArchiveReader {
            pool,
            files,
            file_index: 0,
            current: None,
            pending: None,
        })
    }

    fn open_next_file(&mut self) -> Result<bool> {
        if self.file_index >= self.files.len() {
            return Ok(false);
        }
        let path = self.files[self.file_index].clone();
        self.file_index += 1;
        let mut reader = format::open_reader(&path).map_err(NidasError::Io)?;
        // The header sample always precedes the stream; skip it, but
        // don't drop a real first sample if one is missing.
        if let Some(sample) = format::read_sample(&mut reader, &self.pool)? {
            if sample.id().raw() != ARCHIVE_HEADER_ID {
                self.pending = Some(sample);
            }
        }
        self.current = Some(reader);
        Ok(true)
    }

    /// Read the next sample across the whole file sequence, transparently
    /// advancing to the next file on EOF. Returns `Ok(None)` once every
    /// enumerated file is exhausted.
    pub fn next_sample(&mut self) -> Result<Option<SampleRef>> {
        loop {
            if let Some(s) = self.pending.take() {
                return Ok(Some(s));
            }
            if self.current.is_none() && !self.open_next_file()? {
                return Ok(None);
            }
            let reader = self.current.as_mut().expect("just opened");
            match format::read_sample(reader, &self.pool)? {
                Some(s) => return Ok(Some(s)),
                None => {
                    self.current = None;
                }
            }
        }
    }
}

impl Iterator for ArchiveReader {
    type Item = Result<SampleRef>;
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_sample() {
            Ok(Some(s)) => Some(Ok(s)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::FileSetWriter;
    use crate::format::ArchiveHeaderFields;
    use nidas_core::sample::{SampleId, SampleType};
    use tempfile::tempdir;

    #[test]
    fn reads_back_samples_written_across_rotated_files() {
        let dir = tempdir().unwrap();
        let template = format!("{}/X_%Y%m%d.dat", dir.path().display());
        let cfg = FileSetConfig {
            template,
            file_length_usec: 86_400_000_000,
        };
        let mut writer = FileSetWriter::new(cfg.clone()).unwrap();
        let pool = SamplePool::new();
        let header = ArchiveHeaderFields {
            archive_version: 1,
            software_version: "1.0.10".into(),
            project_name: "ISFS".into(),
            platform_name: "N1".into(),
            config_path: "/etc/nidas.xml".into(),
        };

        let day0 = Time::from_ymdhms_usec(2023, 1, 1, 0, 0, 0, 0);
        let day1 = Time::from_ymdhms_usec(2023, 1, 2, 0, 0, 0, 0);
        for (i, tt) in [day0, day1].into_iter().enumerate() {
            writer.ensure_open_for(tt).unwrap();
            let hs = format::build_header_sample(&pool, &header, tt);
            let mut buf = Vec::new();
            format::write_sample(&mut buf, &hs).unwrap();
            writer.write_bytes(&buf).unwrap();

            let mut b = pool.allocate(SampleType::Int32, 1);
            b.set_timetag(tt);
            b.set_id(SampleId(i as u32));
            b.write_bytes(0, &(i as i32).to_ne_bytes());
            b.set_len(1);
            let mut buf = Vec::new();
            format::write_sample(&mut buf, &b.freeze()).unwrap();
            writer.write_bytes(&buf).unwrap();
        }
        writer.flush().unwrap();

        let reader = ArchiveReader::open(&cfg, pool, day0, day1.checked_add_usecs(1)).unwrap();
        let samples: Vec<_> = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].as_i32(), vec![0]);
        assert_eq!(samples[1].as_i32(), vec![1]);
    }
}
