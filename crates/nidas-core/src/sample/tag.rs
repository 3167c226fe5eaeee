// SPDX-License-Identifier: GPL-2.0-or-later

//! Schema descriptors: `SampleTag`, `Variable`, and the `CalFile`/
//! `Converter` machinery that turns raw counts into engineering units,
//! following the original's CalFile row-advance algorithm.

use super::SampleId;
use crate::time::Time;

/// How a variable's raw value should be interpreted for processing
/// purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Continuous,
    Counter,
    Clock,
    Other,
}

/// One coefficient row in a [`CalFile`]: valid from `time` until the next
/// row's time, applied as `y = c0 + c1*x + c2*x^2 + ...`.
#[derive(Debug, Clone)]
pub struct CalRow {
    pub time: Time,
    pub coefficients: Vec<f64>,
}

/// A timestamped, time-ordered sequence of coefficient rows.
/// `advance`/`apply` mirror the original's behavior: rows are consumed in
/// order, and the last row whose time is `<= sample time` is the active
/// one until a later row's time is reached.
#[derive(Debug, Clone, Default)]
pub struct CalFile {
    rows: Vec<CalRow>,
    cursor: usize,
}

impl CalFile {
    pub fn new(mut rows: Vec<CalRow>) -> Self {
        rows.sort_by_key(|r| r.time);
        CalFile { rows, cursor: 0 }
    }

    /// Advance the internal cursor so the active row is the last one
    /// whose time is `<= tt`, then return it. Calling with
    /// monotonically increasing `tt` (the normal case, since samples
    /// arrive sorted) is O(1) amortized; an out-of-order `tt` rewinds.
    pub fn active_row(&mut self, tt: Time) -> Option<&CalRow> {
        if self.rows.is_empty() {
            return None;
        }
        if self.rows[self.cursor].time > tt {
            // fell behind (sample earlier than our cursor); rewind
            while self.cursor > 0 && self.rows[self.cursor].time > tt {
                self.cursor -= 1;
            }
        } else {
            while self.cursor + 1 < self.rows.len() && self.rows[self.cursor + 1].time <= tt {
                self.cursor += 1;
            }
        }
        Some(&self.rows[self.cursor])
    }
}

/// How a variable's raw value is converted to engineering units.
#[derive(Debug, Clone)]
pub enum Converter {
    /// `y = slope * x + intercept`
    Linear { slope: f64, intercept: f64 },
    /// `y = sum(coefficients[i] * x^i)`, highest power last consistent
    /// with `CalRow::coefficients` ordering.
    Polynomial { coefficients: Vec<f64> },
    /// Coefficients come from a [`CalFile`], re-evaluated per sample as
    /// `Polynomial` using whatever row is active for that sample's time.
    CalFile(CalFile),
}

impl Converter {
    pub fn apply(&mut self, tt: Time, raw: f64) -> f64 {
        match self {
            Converter::Linear { slope, intercept } => slope.mul_add(raw, *intercept),
            Converter::Polynomial { coefficients } => eval_poly(coefficients, raw),
            Converter::CalFile(cal) => match cal.active_row(tt) {
                Some(row) => eval_poly(&row.coefficients, raw),
                None => raw,
            },
        }
    }
}

fn eval_poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc.mul_add(x, c))
}

/// Name, units, and conversion rule for one scalar or vector quantity
/// within a [`SampleTag`]'s stream.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub long_name: String,
    pub units: String,
    /// 1 for a scalar, >1 for a vector (e.g. a spectrum).
    pub length: usize,
    pub kind: NumericKind,
    pub converter: Option<Converter>,
}

impl Variable {
    pub fn scalar(name: impl Into<String>, units: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            long_name: String::new(),
            units: units.into(),
            length: 1,
            kind: NumericKind::Continuous,
            converter: None,
        }
    }

    pub fn convert(&mut self, tt: Time, raw: f64) -> f64 {
        match &mut self.converter {
            Some(c) => c.apply(tt, raw),
            None => raw,
        }
    }
}

/// Schema descriptor identifying one stream of samples: a single id, a
/// nominal rate, its ordered variables, and an optional scanf format.
#[derive(Debug, Clone)]
pub struct SampleTag {
    pub id: SampleId,
    /// Nominal sample rate in Hz; may be fractional (e.g. a 0.1 Hz probe).
    pub rate: f64,
    pub variables: Vec<Variable>,
    pub scanf_format: Option<String>,
}

impl SampleTag {
    pub fn new(id: SampleId, rate: f64) -> Self {
        SampleTag {
            id,
            rate,
            variables: Vec::new(),
            scanf_format: None,
        }
    }

    /// Total scalar width across all variables (sum of `length`), the
    /// unit the sync-record row stride is built from.
    pub fn data_width(&self) -> usize {
        self.variables.iter().map(|v| v.length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cal_file_advances_monotonically() {
        let mut cal = CalFile::new(vec![
            CalRow {
                time: Time::from_usecs(0),
                coefficients: vec![0.0, 1.0],
            },
            CalRow {
                time: Time::from_usecs(1000),
                coefficients: vec![10.0, 2.0],
            },
        ]);
        assert_eq!(cal.active_row(Time::from_usecs(500)).unwrap().time.usecs(), 0);
        assert_eq!(
            cal.active_row(Time::from_usecs(1500)).unwrap().time.usecs(),
            1000
        );
    }

    #[test]
    fn cal_file_rewinds_on_out_of_order_time() {
        let mut cal = CalFile::new(vec![
            CalRow {
                time: Time::from_usecs(0),
                coefficients: vec![0.0],
            },
            CalRow {
                time: Time::from_usecs(1000),
                coefficients: vec![1.0],
            },
        ]);
        cal.active_row(Time::from_usecs(2000));
        assert_eq!(cal.active_row(Time::from_usecs(10)).unwrap().time.usecs(), 0);
    }

    #[test]
    fn linear_converter() {
        let mut c = Converter::Linear {
            slope: 2.0,
            intercept: 1.0,
        };
        assert_eq!(c.apply(Time::ZERO, 3.0), 7.0);
    }

    #[test]
    fn polynomial_converter() {
        let mut c = Converter::Polynomial {
            coefficients: vec![1.0, 0.0, 1.0], // 1 + x^2
        };
        assert_eq!(c.apply(Time::ZERO, 3.0), 10.0);
    }
}
