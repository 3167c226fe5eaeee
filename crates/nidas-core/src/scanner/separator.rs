// SPDX-License-Identifier: GPL-2.0-or-later

//! Separator literal parsing: backslash-escape decoding for `\n \r \t \\
//! \xhh \ooo`.

/// Decode a separator string containing backslash escapes into raw bytes.
/// Unrecognised escapes pass through as the literal characters following
/// the backslash.
pub fn decode_separator(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        match next {
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'x' => {
                let (val, consumed) = parse_radix(&bytes[i + 2..], 16, 2);
                if consumed > 0 {
                    out.push(val);
                    i += 2 + consumed;
                } else {
                    out.push(b'x');
                    i += 2;
                }
            }
            b'0'..=b'7' => {
                let (val, consumed) = parse_radix(&bytes[i + 1..], 8, 3);
                out.push(val);
                i += 1 + consumed;
            }
            other => {
                out.push(other);
                i += 2;
            }
        }
    }
    out
}

fn parse_radix(bytes: &[u8], radix: u32, max_digits: usize) -> (u8, usize) {
    let mut value: u32 = 0;
    let mut count = 0;
    for &b in bytes.iter().take(max_digits) {
        let digit = match (b as char).to_digit(radix) {
            Some(d) => d,
            None => break,
        };
        value = value * radix + digit;
        count += 1;
    }
    (value as u8, count)
}

/// True if `sep` ends with a carriage-return or line-feed, the gate on
/// `nullTerminate` (disabled if the separator doesn't terminate with
/// CR/LF).
pub fn ends_with_crlf(sep: &[u8]) -> bool {
    matches!(sep.last(), Some(b'\r' | b'\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_escapes() {
        assert_eq!(decode_separator(r"\r\n"), b"\r\n");
        assert_eq!(decode_separator(r"\t"), b"\t");
        assert_eq!(decode_separator(r"\\"), b"\\");
    }

    #[test]
    fn decodes_hex_escape() {
        assert_eq!(decode_separator(r"\x0d\x0a"), b"\r\n");
    }

    #[test]
    fn decodes_octal_escape() {
        assert_eq!(decode_separator(r"\015\012"), b"\r\n");
    }

    #[test]
    fn passes_through_unrecognised_escape_literally() {
        assert_eq!(decode_separator(r"\q"), b"q");
    }

    #[test]
    fn plain_literal_separator() {
        assert_eq!(decode_separator("$GPRMC"), b"$GPRMC");
    }

    #[test]
    fn crlf_gate() {
        assert!(ends_with_crlf(b"\r\n"));
        assert!(ends_with_crlf(b"\n"));
        assert!(!ends_with_crlf(b"$GPRMC"));
    }
}
