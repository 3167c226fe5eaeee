// SPDX-License-Identifier: GPL-2.0-or-later

//! Byte-stream-to-sample framer.
//!
//! Turns a raw byte stream into framed [`SampleRef`]s using a literal
//! separator either at the beginning (`Bom`) or end (`Eom`) of each
//! message, with either a fixed data length or variable length bounded
//! by the separator's next occurrence.

pub mod scanf;
mod separator;

pub use separator::decode_separator;

use crate::sample::{SamplePool, SampleRef, SampleType};
use crate::time::{Time, USECS_PER_SEC};
use std::sync::Arc;

/// Where the configured separator appears relative to message data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Beginning Of Message: separator precedes the data, included in
    /// the emitted payload.
    Bom,
    /// End Of Message: separator follows the data, included in the
    /// emitted payload.
    Eom,
}

/// Message scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub separator: Vec<u8>,
    pub position: Position,
    /// Fixed data length excluding separator; 0 means variable length.
    pub message_length: usize,
    /// Appended zero byte to each emitted sample, gated on the
    /// separator terminating with CR/LF.
    pub null_terminate: bool,
    pub max_sample_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            separator: Vec::new(),
            position: Position::Eom,
            message_length: 0,
            null_terminate: false,
            max_sample_size: 8192,
        }
    }
}

impl ScannerConfig {
    /// Whether `null_terminate` actually takes effect: disabled if the
    /// separator doesn't terminate with CR/LF.
    pub fn effective_null_terminate(&self) -> bool {
        self.null_terminate && separator::ends_with_crlf(&self.separator)
    }
}

/// Running counters exposed for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScannerStats {
    pub sample_overflows: u64,
    pub scanf_partials: u64,
    pub scanf_failures: u64,
}

/// Stateful byte-stream framer. One instance per sensor/port.
pub struct MessageScanner {
    config: ScannerConfig,
    stats: ScannerStats,
    sep_cnt: usize,
    current: Vec<u8>,
    current_tt: Option<Time>,
    pending_match_tt: Option<Time>,
}

impl MessageScanner {
    pub fn new(config: ScannerConfig) -> Self {
        MessageScanner {
            config,
            stats: ScannerStats::default(),
            sep_cnt: 0,
            current: Vec::new(),
            current_tt: None,
            pending_match_tt: None,
        }
    }

    pub fn stats(&self) -> ScannerStats {
        self.stats
    }

    /// Feed one read buffer. `buf_time` is the timestamp of `data[0]`
    /// (typically `now - bytes_in_buffer * usec_per_char`);
    /// `usec_per_char` is `1e6 / baud * bits_per_char`.
    /// Completed frames are allocated from `pool` and returned in order.
    pub fn feed(
        &mut self,
        pool: &Arc<SamplePool>,
        data: &[u8],
        buf_time: Time,
        usec_per_char: f64,
    ) -> Vec<SampleRef> {
        let mut out = Vec::new();
        let byte_time =
            |offset: usize| buf_time.checked_add_usecs((offset as f64 * usec_per_char) as i64);
        match self.config.position {
            Position::Bom => self.feed_bom(pool, data, byte_time, &mut out),
            Position::Eom => self.feed_eom(pool, data, byte_time, &mut out),
        }
        out
    }

    fn push_current(&mut self, c: u8, tt: Time) {
        if self.current.is_empty() {
            self.current_tt = Some(tt);
        }
        self.current.push(c);
    }

    fn check_overflow(&mut self, pool: &Arc<SamplePool>, out: &mut Vec<SampleRef>) {
        if self.current.len() > self.config.max_sample_size {
            self.stats.sample_overflows += 1;
            self.emit_current(pool, out);
            self.sep_cnt = 0;
        }
    }

    fn emit_current(&mut self, pool: &Arc<SamplePool>, out: &mut Vec<SampleRef>) {
        if self.current.is_empty() {
            return;
        }
        let mut payload = std::mem::take(&mut self.current);
        if self.config.effective_null_terminate() {
            payload.push(0);
        }
        let tt = self.current_tt.unwrap_or(Time::ZERO);
        self.current_tt = None;
        let mut b = pool.allocate(SampleType::Byte, payload.len());
        b.set_timetag(tt);
        b.write_bytes(0, &payload);
        b.set_len(payload.len());
        out.push(b.freeze());
    }

    fn feed_bom(
        &mut self,
        pool: &Arc<SamplePool>,
        data: &[u8],
        byte_time: impl Fn(usize) -> Time,
        out: &mut Vec<SampleRef>,
    ) {
        let seplen = self.config.separator.len();
        let mut i = 0;
        while i < data.len() {
            let c = data[i];
            if self.sep_cnt < seplen {
                if seplen > 0 && c == self.config.separator[self.sep_cnt] {
                    if self.sep_cnt == 0 {
                        self.pending_match_tt = Some(byte_time(i));
                    }
                    self.sep_cnt += 1;
                    i += 1;
                    if self.sep_cnt == seplen {
                        self.emit_current(pool, out);
                        self.current.clear();
                        self.current.extend_from_slice(&self.config.separator);
                        self.current_tt = self.pending_match_tt.take();
                    }
                } else if self.sep_cnt > 0 {
                    // partial separator match broke; flush it into the
                    // current sample and retry this byte from scratch
                    let partial = self.config.separator[..self.sep_cnt].to_vec();
                    if self.current.is_empty() {
                        self.current_tt = self.pending_match_tt.take();
                    }
                    self.current.extend_from_slice(&partial);
                    self.sep_cnt = 0;
                    // do not advance i: retry c at separator position 0
                } else {
                    self.push_current(c, byte_time(i));
                    i += 1;
                    self.check_overflow(pool, out);
                }
            } else if self.config.message_length == 0 {
                if seplen > 0 && c == self.config.separator[0] {
                    self.sep_cnt = 0; // retry as a possible new separator, byte not consumed
                } else {
                    self.push_current(c, byte_time(i));
                    i += 1;
                    self.check_overflow(pool, out);
                }
            } else {
                self.push_current(c, byte_time(i));
                i += 1;
                let data_len = self.current.len().saturating_sub(seplen);
                if data_len >= self.config.message_length {
                    self.emit_current(pool, out);
                    self.sep_cnt = 0;
                } else {
                    self.check_overflow(pool, out);
                }
            }
        }
    }

    fn feed_eom(
        &mut self,
        pool: &Arc<SamplePool>,
        data: &[u8],
        byte_time: impl Fn(usize) -> Time,
        out: &mut Vec<SampleRef>,
    ) {
        let seplen = self.config.separator.len();
        for (i, &c) in data.iter().enumerate() {
            self.push_current(c, byte_time(i));
            let matching_active =
                seplen > 0 && (self.config.message_length == 0 || self.current.len() > self.config.message_length);
            if matching_active && c == self.config.separator[self.sep_cnt] {
                self.sep_cnt += 1;
                if self.sep_cnt == seplen {
                    self.emit_current(pool, out);
                    self.sep_cnt = 0;
                    continue;
                }
            } else if matching_active {
                self.sep_cnt = usize::from(seplen > 0 && c == self.config.separator[0]);
            }
            self.check_overflow(pool, out);
        }
    }
}

pub const USECS_PER_CHAR_DEFAULT: f64 = USECS_PER_SEC as f64 / 9600.0 * 10.0;
