// SPDX-License-Identifier: GPL-2.0-or-later

//! Time-templated rotating archive files.
//!
//! The write side expands a strftime-style template at the boundary
//! `T_file = T_now - (T_now mod fileLength)`, rotating when a sample's
//! timetag reaches the precomputed `T_next`. The read side turns a
//! template plus `[T_start, T_end]` into the matching files on disk by
//! building a regex out of the template's time fields the way the
//! teacher's config layer turns a pattern into a validated, reusable
//! matcher.

use chrono::NaiveDate;
use nidas_core::error::{NidasError, Result};
use nidas_core::time::{Time, USECS_PER_DAY};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Knobs for a `FileSet`.
#[derive(Debug, Clone)]
pub struct FileSetConfig {
    /// strftime-style path template, e.g. `"/data/proj/%Y/%m/X_%Y%m%d_%H%M%S.dat"`.
    pub template: String,
    /// Rotation boundary, in microseconds. Default one day.
    pub file_length_usec: i64,
}

impl Default for FileSetConfig {
    fn default() -> Self {
        FileSetConfig {
            template: String::new(),
            file_length_usec: USECS_PER_DAY,
        }
    }
}

impl FileSetConfig {
    /// Reject templates using the alpha-month field (`%b`/`%B`), which
    /// don't sort in timetag order across a year boundary.
    pub fn validate(&self) -> Result<()> {
        if self.template.contains("%b") || self.template.contains("%B") {
            return Err(NidasError::InvalidParameter(
                "file set template may not use alpha month fields (%b/%B)".into(),
            ));
        }
        if self.file_length_usec <= 0 {
            return Err(NidasError::InvalidParameter(
                "file_length_usec must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn expand(template: &str, usecs: i64) -> String {
    let (y, mon, d, h, mi, s, _) = Time::from_usecs(usecs).to_ymdhms_usec();
    let date = NaiveDate::from_ymd_opt(y as i32, mon, d)
        .and_then(|d| d.and_hms_opt(h, mi, s))
        .expect("valid calendar date from Time");
    date.format(template).to_string()
}

/// The write side of a `FileSet`: owns the currently open file and
/// rotates it on demand.
pub struct FileSetWriter {
    config: FileSetConfig,
    current: Option<(File, PathBuf, i64)>, // file, path, t_next
}

impl FileSetWriter {
    pub fn new(config: FileSetConfig) -> Result<Self> {
        config.validate()?;
        Ok(FileSetWriter {
            config,
            current: None,
        })
    }

    /// Ensure a file covering `tt` is open, rotating if needed. Returns
    /// `true` if a new file was opened (callers use this to decide
    /// whether to re-write the header sample).
    pub fn ensure_open_for(&mut self, tt: Time) -> io::Result<bool> {
        if let Some((_, _, t_next)) = &self.current {
            if tt.usecs() < *t_next {
                return Ok(false);
            }
        }
        self.rotate(tt)?;
        Ok(true)
    }

    fn rotate(&mut self, tt: Time) -> io::Result<()> {
        let t_file = tt.floor(self.config.file_length_usec);
        let t_next = t_file.checked_add_usecs(self.config.file_length_usec).usecs();

        let mut candidate = t_file.usecs();
        loop {
            let path = PathBuf::from(expand(&self.config.template, candidate));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => {
                    self.current = Some((f, path, t_next));
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate += nidas_core::time::USECS_PER_SEC;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn write_at(&mut self, tt: Time, bytes: &[u8]) -> io::Result<bool> {
        let rotated = self.ensure_open_for(tt)?;
        self.write_bytes(bytes)?;
        Ok(rotated)
    }

    /// Write to whichever file is currently open, without checking
    /// rotation. Callers that already called `ensure_open_for` (to
    /// decide whether to re-emit a header) use this to avoid a second,
    /// redundant rotation check against a possibly unrelated timetag.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.current
            .as_mut()
            .expect("ensure_open_for must be called first")
            .0
            .write_all(bytes)
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|(_, p, _)| p.as_path())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        use std::io::Write;
        if let Some((f, _, _)) = &mut self.current {
            f.flush()?;
        }
        Ok(())
    }
}

struct TemplateMatcher {
    regex: Regex,
    fields: Vec<char>,
}

fn compile(template: &str) -> TemplateMatcher {
    let mut pattern = String::from("^");
    let mut fields = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(&code) = chars.peek() {
                let cls = match code {
                    'Y' => Some("([0-9]{4})"),
                    'm' => Some("([0-1][0-9])"),
                    'd' => Some("([0-3][0-9])"),
                    'H' => Some("([0-2][0-9])"),
                    'M' => Some("([0-5][0-9])"),
                    'S' => Some("([0-5][0-9])"),
                    _ => None,
                };
                if let Some(cls) = cls {
                    chars.next();
                    pattern.push_str(cls);
                    fields.push(code);
                    continue;
                }
            }
        }
        pattern.push_str(&regex::escape(&c.to_string()));
    }
    pattern.push('$');
    TemplateMatcher {
        regex: Regex::new(&pattern).expect("template regex always compiles"),
        fields,
    }
}

/// Coarsest field present in a template (used to pick the directory-scan
/// step for the read-side enumeration algorithm: at least one hour, up to a
/// year).
fn coarsest_step_usec(template: &str) -> i64 {
    use nidas_core::time::USECS_PER_HOUR;
    if template.contains("%Y") {
        365 * USECS_PER_DAY
    } else if template.contains("%m") {
        31 * USECS_PER_DAY
    } else if template.contains("%d") {
        USECS_PER_DAY
    } else {
        USECS_PER_HOUR
    }
}

fn apply_fields(base: i64, fields: &[char], captures: &regex::Captures) -> Option<i64> {
    let (mut y, mut mon, mut d, mut h, mut mi, mut s, _) = Time::from_usecs(base).to_ymdhms_usec();
    for (i, field) in fields.iter().enumerate() {
        let v: i64 = captures.get(i + 1)?.as_str().parse().ok()?;
        match field {
            'Y' => y = v,
            'm' => mon = v as u32,
            'd' => d = v as u32,
            'H' => h = v as u32,
            'M' => mi = v as u32,
            'S' => s = v as u32,
            _ => {}
        }
    }
    Some(Time::from_ymdhms_usec(y, mon, d, h, mi, s, 0).usecs())
}

/// Enumerate files matching `config.template` whose covered interval
/// overlaps `[start, end]`, sorted ascending, with the newest file
/// timetagged at or before `start` included.
pub fn enumerate(config: &FileSetConfig, start: Time, end: Time) -> io::Result<Vec<PathBuf>> {
    let matcher = compile(&config.template);
    let step = coarsest_step_usec(&config.template);
    let lookback = 4 * config.file_length_usec;

    let mut candidate = start.usecs().saturating_sub(lookback);
    let end_usec = end.usecs();
    let mut seen_dirs = std::collections::HashSet::new();
    let mut found = Vec::new();

    while candidate <= end_usec {
        let expanded = expand(&config.template, candidate);
        let path = PathBuf::from(&expanded);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if seen_dirs.insert(dir.clone()) {
            if let Ok(entries) = fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    let full = dir.join(name.as_ref());
                    let rel = full.to_string_lossy().to_string();
                    if let Some(caps) = matcher.regex.captures(&rel) {
                        if let Some(t) = apply_fields(candidate, &matcher.fields, &caps) {
                            if t >= start.usecs().saturating_sub(lookback) && t <= end_usec {
                                found.push((t, full));
                            }
                        }
                    }
                }
            }
        }
        candidate += step;
    }

    found.sort_by_key(|(t, _)| *t);
    found.dedup_by(|a, b| a.1 == b.1);
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writer_rotates_files_at_daily_boundary() {
        let dir = tempdir().unwrap();
        let template = format!("{}/X_%Y%m%d.dat", dir.path().display());
        let mut writer = FileSetWriter::new(FileSetConfig {
            template,
            file_length_usec: 86_400_000_000,
        })
        .unwrap();

        let start = Time::from_ymdhms_usec(2023, 1, 1, 0, 0, 0, 0);
        for hour in 0..36 {
            let tt = start.checked_add_usecs(hour * 3_600_000_000);
            writer.write_at(tt, b"x").unwrap();
        }
        writer.flush().unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["X_20230101.dat", "X_20230102.dat"]);
    }

    #[test]
    fn rejects_alpha_month_template() {
        let cfg = FileSetConfig {
            template: "X_%b%d.dat".into(),
            file_length_usec: 86_400_000_000,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retries_on_name_collision() {
        let dir = tempdir().unwrap();
        let template = format!("{}/X_%Y%m%d%H%M%S.dat", dir.path().display());
        let mut writer = FileSetWriter::new(FileSetConfig {
            template,
            file_length_usec: 1_000_000_000_000, // one file for a long time
        })
        .unwrap();
        let t0 = Time::from_usecs(0);
        writer.ensure_open_for(t0).unwrap();
        let first = writer.current_path().unwrap().to_path_buf();

        // Force a second writer to collide on the same name by reusing t0.
        let template2 = first
            .parent()
            .unwrap()
            .join("X_%Y%m%d%H%M%S.dat")
            .to_string_lossy()
            .to_string();
        let mut writer2 = FileSetWriter::new(FileSetConfig {
            template: template2,
            file_length_usec: 1_000_000_000_000,
        })
        .unwrap();
        writer2.ensure_open_for(t0).unwrap();
        let second = writer2.current_path().unwrap().to_path_buf();
        assert_ne!(first, second);
    }
}
