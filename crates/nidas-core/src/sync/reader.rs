// SPDX-License-Identifier: GPL-2.0-or-later

//! Sync-record reader: parses the header the way it was built, then
//! inverts each record back into per-variable, per-second vectors.

use super::header::{kind_from_letter, parse_keyed_fields, HeaderFields, HeaderTag, HeaderVariable, Tokenizer};
use crate::error::{NidasError, Result};
use std::io::{BufRead, Read};

/// Where one variable's values live within every sync record: the byte
/// offset of its first f64 cell, the stride between consecutive
/// sub-second slots, and how many slots the owning tag's rate implies
/// (the original's `syncRecOffset`/`lagOffset`).
#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub name: String,
    pub units: String,
    /// Offset of the tag's offset-microsecond cell (slot 0 of its row).
    pub lag_offset: usize,
    /// Offset of this variable's first (time_index == 0) data cell.
    pub sync_rec_offset: usize,
    pub length: usize,
    pub n_slots: usize,
    /// Total per-slot width of the owning tag (sum of all its
    /// variables' lengths); the stride between consecutive sub-second
    /// slots for this variable's cells.
    pub tag_data_width: usize,
}

pub struct SyncRecordReader<R> {
    inner: R,
    pub fields: HeaderFields,
    pub slots: Vec<VariableSlot>,
    record_len: usize,
}

impl<R: BufRead> SyncRecordReader<R> {
    /// Read and parse the header from `inner`, positioning it to read
    /// records with `read_record`/`read`.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut header_text = String::new();
        loop {
            let mut line = String::new();
            let n = inner
                .read_line(&mut line)
                .map_err(NidasError::Io)?;
            if n == 0 {
                return Err(NidasError::Parse("sync header truncated before '#'".into()));
            }
            header_text.push_str(&line);
            if line.trim_end() == "#" || line.trim_end().ends_with('#') {
                break;
            }
        }

        let vars_at = header_text
            .find("variables")
            .ok_or_else(|| NidasError::Parse("missing variables block".into()))?;
        let fields = parse_keyed_fields(&header_text[..vars_at]);

        let rates_at = header_text
            .find("rates")
            .ok_or_else(|| NidasError::Parse("missing rates block".into()))?;
        let var_block = &header_text[vars_at..rates_at];
        let rate_block = &header_text[rates_at..];

        let variables = parse_variables_block(var_block)?;
        let tags = parse_rates_block(rate_block, variables)?;

        let mut slots = Vec::new();
        let mut offset = 0usize;
        for tag in &tags {
            let n_slots = tag.rate.ceil().max(1.0) as usize;
            let data_width: usize = tag.variables.iter().map(|v| v.length).sum::<usize>().max(1);
            let stride = 1 + n_slots * data_width;
            let mut sub_offset = 0usize;
            for v in &tag.variables {
                slots.push(VariableSlot {
                    name: v.name.clone(),
                    units: v.units.clone(),
                    lag_offset: offset,
                    sync_rec_offset: offset + 1 + sub_offset,
                    length: v.length,
                    n_slots,
                    tag_data_width: data_width,
                });
                sub_offset += v.length;
            }
            offset += stride;
        }
        let record_len = offset;

        Ok(SyncRecordReader {
            inner,
            fields,
            slots,
            record_len,
        })
    }

    /// Read one full sync record's timetag and raw cell vector. Returns
    /// `Ok(None)` on orderly EOF.
    pub fn read_record(&mut self) -> Result<Option<(i64, Vec<f64>)>> {
        let mut tt_buf = [0u8; 8];
        match self.inner.read_exact(&mut tt_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(NidasError::Io(e)),
        }
        let tt = i64::from_le_bytes(tt_buf);

        let mut data = vec![0u8; self.record_len * 8];
        self.inner.read_exact(&mut data).map_err(NidasError::Io)?;
        let values = data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Some((tt, values)))
    }

    /// Copy variable `name`'s per-second vector for one record into
    /// `dest`. Returns the number of values written, matching the
    /// original's `read(tt, dest, len) -> n_values`.
    pub fn read(&self, name: &str, record: &[f64], dest: &mut [f64]) -> usize {
        let Some(slot) = self.slots.iter().find(|s| s.name == name) else {
            return 0;
        };
        let mut n = 0;
        for i in 0..slot.n_slots {
            for j in 0..slot.length {
                if n >= dest.len() {
                    return n;
                }
                dest[n] = record[slot.sync_rec_offset + i * slot.tag_data_width + j];
                n += 1;
            }
        }
        n
    }
}

fn parse_variables_block(block: &str) -> Result<Vec<HeaderVariable>> {
    let mut tok = Tokenizer::new(block);
    let t = tok.next_token().ok_or_else(|| NidasError::Parse("empty variables block".into()))?;
    if t != "variables" {
        return Err(NidasError::Parse(format!("expected 'variables', got {t}")));
    }
    let brace = tok.next_token();
    if brace.as_deref() != Some("{") {
        return Err(NidasError::Parse("expected '{' after variables".into()));
    }

    let mut vars = Vec::new();
    loop {
        let Some(name) = tok.next_token() else { break };
        if name == "}" {
            break;
        }
        let letter = tok
            .next_token()
            .ok_or_else(|| NidasError::Parse("variable missing type letter".into()))?;
        let kind = kind_from_letter(letter.chars().next().unwrap_or('n'))
            .ok_or_else(|| NidasError::Parse(format!("unknown type letter {letter}")))?;
        let length: usize = tok
            .next_token()
            .ok_or_else(|| NidasError::Parse("variable missing length".into()))?
            .parse()
            .map_err(|_| NidasError::Parse("variable length not an integer".into()))?;
        let units = tok.next_token().unwrap_or_default();
        let long_name = tok.next_token().unwrap_or_default();

        let mut converted_units = None;
        loop {
            let next = tok
                .next_token()
                .ok_or_else(|| NidasError::Parse("unterminated variable entry".into()))?;
            if next == ";" {
                break;
            }
            if converted_units.is_none() && !next.contains('=') {
                converted_units = Some(next);
            }
        }

        vars.push(HeaderVariable {
            name,
            kind,
            length,
            units,
            long_name,
            converted_units,
        });
    }
    Ok(vars)
}

fn parse_rates_block(block: &str, mut variables: Vec<HeaderVariable>) -> Result<Vec<HeaderTag>> {
    let mut tok = Tokenizer::new(block);
    let t = tok.next_token().ok_or_else(|| NidasError::Parse("empty rates block".into()))?;
    if t != "rates" {
        return Err(NidasError::Parse(format!("expected 'rates', got {t}")));
    }
    if tok.next_token().as_deref() != Some("{") {
        return Err(NidasError::Parse("expected '{' after rates".into()));
    }

    let mut by_name: std::collections::HashMap<String, HeaderVariable> = variables
        .drain(..)
        .map(|v| (v.name.clone(), v))
        .collect();

    let mut tags = Vec::new();
    let mut next_id = 0u32;
    loop {
        let Some(tok0) = tok.next_token() else { break };
        if tok0 == "}" {
            break;
        }
        let rate: f64 = tok0
            .parse()
            .map_err(|_| NidasError::Parse(format!("rate is not numeric: {tok0}")))?;
        let mut vars = Vec::new();
        loop {
            let name = tok
                .next_token()
                .ok_or_else(|| NidasError::Parse("unterminated rates entry".into()))?;
            if name == ";" {
                break;
            }
            let v = by_name
                .remove(&name)
                .ok_or_else(|| NidasError::Parse(format!("rates references unknown variable {name}")))?;
            vars.push(v);
        }
        tags.push(HeaderTag {
            id: next_id,
            rate,
            variables: vars,
        });
        next_id += 1;
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::super::header::{write_header, HeaderFields as WF, HeaderTag as WT, HeaderVariable as WV};
    use super::*;
    use crate::sample::NumericKind;
    use std::io::Cursor;

    #[test]
    fn header_parses_back_into_variable_slots() {
        let fields = WF {
            project: "ISFS".into(),
            aircraft: "N1".into(),
            flight: "tf01".into(),
            software_version: "1.0".into(),
        };
        let tags = vec![
            WT {
                id: 100,
                rate: 10.0,
                variables: vec![WV {
                    name: "u".into(),
                    kind: NumericKind::Continuous,
                    length: 1,
                    units: "m/s".into(),
                    long_name: "U wind".into(),
                    converted_units: None,
                }],
            },
            WT {
                id: 200,
                rate: 1.0,
                variables: vec![
                    WV {
                        name: "p".into(),
                        kind: NumericKind::Continuous,
                        length: 1,
                        units: "hPa".into(),
                        long_name: "pressure".into(),
                        converted_units: None,
                    },
                    WV {
                        name: "t".into(),
                        kind: NumericKind::Continuous,
                        length: 1,
                        units: "degC".into(),
                        long_name: "temperature".into(),
                        converted_units: None,
                    },
                ],
            },
        ];
        let text = write_header(&fields, &tags);

        let reader = SyncRecordReader::new(Cursor::new(text.into_bytes())).unwrap();
        assert_eq!(reader.fields.project, "ISFS");
        assert_eq!(reader.slots.len(), 3);
        assert_eq!(reader.slots[0].name, "u");
        assert_eq!(reader.slots[0].n_slots, 10);
        assert_eq!(reader.slots[1].name, "p");
        assert_eq!(reader.slots[1].lag_offset, 11); // after u's 1+10 row
    }
}
