// SPDX-License-Identifier: GPL-2.0-or-later

//! Client side of the remote-serial tap (the `rserial` binary), grounded
//! on `RemoteSerial`'s `openConnection`/polling-loop/`charout` in
//! `nidas/apps/rserial.cc`.
//!
//! The escape sequences `ESC a` (switch to ASCII display), `ESC h`
//! (switch to hex display), and `ESC ESC` (send a literal escape byte)
//! are interpreted here, on stdin, before anything reaches the socket --
//! the server (`super::server::TapServer`) never sees them.

/// The escape character recognized on stdin.
pub const ESC: u8 = 0x1b;

/// How bytes read back from the device are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Ascii,
    Hex,
    Both,
}

/// Stateful filter over a stdin byte stream: strips and interprets
/// escape sequences, returning the bytes that should actually be sent
/// to the socket.
#[derive(Debug, Default)]
pub struct EscapeFilter {
    last_char_esc: bool,
}

impl EscapeFilter {
    pub fn new() -> Self {
        EscapeFilter::default()
    }

    /// Run one chunk of stdin bytes through the filter, updating `mode`
    /// in place on `ESC a`/`ESC h`, and returning the bytes to forward
    /// to the socket verbatim (an `ESC ESC` or `ESC <anything else>`
    /// forwards as the literal two-byte sequence, matching the
    /// original's `default:` case).
    pub fn filter(&mut self, input: &[u8], mode: &mut OutputMode) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        for &c in input {
            if self.last_char_esc {
                self.last_char_esc = false;
                match c {
                    b'a' => *mode = OutputMode::Ascii,
                    b'h' => *mode = OutputMode::Hex,
                    _ => {
                        out.push(ESC);
                        out.push(c);
                    }
                }
            } else if c == ESC {
                self.last_char_esc = true;
            } else {
                out.push(c);
            }
        }
        out
    }
}

/// Format one byte read back from the device for display, per
/// `RemoteSerial::charout`.
pub fn format_display(mode: OutputMode, c: u8) -> String {
    match mode {
        OutputMode::Hex => format!("{c:02x} "),
        OutputMode::Both => {
            if c.is_ascii_graphic() || c == b' ' {
                format!("{c:02x}'{}' ", c as char)
            } else {
                format!("{c:02x}     ")
            }
        }
        OutputMode::Ascii => match c {
            b'\r' => "\\r".to_string(),
            b'\n' => "\\n".to_string(),
            b'\t' => "\\t".to_string(),
            _ if c.is_ascii_graphic() || c == b' ' => (c as char).to_string(),
            _ => format!("\\x{c:02x}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through_unchanged() {
        let mut f = EscapeFilter::new();
        let mut mode = OutputMode::Ascii;
        assert_eq!(f.filter(b"hello", &mut mode), b"hello");
        assert_eq!(mode, OutputMode::Ascii);
    }

    #[test]
    fn esc_a_switches_to_ascii_without_forwarding_bytes() {
        let mut f = EscapeFilter::new();
        let mut mode = OutputMode::Hex;
        let out = f.filter(&[ESC, b'a'], &mut mode);
        assert!(out.is_empty());
        assert_eq!(mode, OutputMode::Ascii);
    }

    #[test]
    fn esc_h_switches_to_hex_without_forwarding_bytes() {
        let mut f = EscapeFilter::new();
        let mut mode = OutputMode::Ascii;
        let out = f.filter(&[ESC, b'h'], &mut mode);
        assert!(out.is_empty());
        assert_eq!(mode, OutputMode::Hex);
    }

    #[test]
    fn esc_esc_forwards_a_literal_escape_pair() {
        let mut f = EscapeFilter::new();
        let mut mode = OutputMode::Ascii;
        let out = f.filter(&[ESC, ESC], &mut mode);
        assert_eq!(out, vec![ESC, ESC]);
    }

    #[test]
    fn escape_split_across_two_chunks_still_resolves() {
        let mut f = EscapeFilter::new();
        let mut mode = OutputMode::Hex;
        assert!(f.filter(&[ESC], &mut mode).is_empty());
        assert!(f.filter(&[b'a'], &mut mode).is_empty());
        assert_eq!(mode, OutputMode::Ascii);
    }

    #[test]
    fn ascii_mode_escapes_nonprinting_bytes() {
        assert_eq!(format_display(OutputMode::Ascii, b'\n'), "\\n");
        assert_eq!(format_display(OutputMode::Ascii, b'A'), "A");
        assert_eq!(format_display(OutputMode::Ascii, 0x01), "\\x01");
    }

    #[test]
    fn hex_mode_formats_every_byte_as_two_hex_digits() {
        assert_eq!(format_display(OutputMode::Hex, 0xAB), "ab ");
    }
}
