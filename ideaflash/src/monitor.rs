//! Text helpers for relaying device output.

/// Drain buffered bytes into displayable UTF-8 text without stalling on invalid bytes.
///
/// - Valid UTF-8 is emitted as-is.
/// - Invalid byte sequences emit the replacement char `�` and continue.
/// - Incomplete UTF-8 suffix is kept in `buffer` for the next read.
pub fn drain_utf8_lossy(buffer: &mut Vec<u8>) -> String {
    let mut output = String::new();

    loop {
        match std::str::from_utf8(buffer) {
            Ok(valid) => {
                output.push_str(valid);
                buffer.clear();
                break;
            },
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                if valid_up_to > 0 {
                    if let Ok(valid) = std::str::from_utf8(&buffer[..valid_up_to]) {
                        output.push_str(valid);
                    }
                }

                match err.error_len() {
                    Some(invalid_len) => {
                        output.push('�');
                        let drain_to = valid_up_to
                            .saturating_add(invalid_len)
                            .min(buffer.len());
                        buffer.drain(..drain_to);
                    },
                    None => {
                        if valid_up_to > 0 {
                            buffer.drain(..valid_up_to);
                        }
                        break;
                    },
                }
            },
        }
    }

    output
}

/// Filter non-printable control characters.
///
/// Keeps `\n`, `\t` and printable Unicode chars. `\r\n` and lone `\r`
/// both become `\n`. ANSI escape sequences (`ESC [ ... final`, and
/// two-character `ESC x`) are removed whole; other control characters are
/// dropped.
pub fn clean_monitor_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text
        .chars()
        .peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\n' | '\t' => out.push(ch),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            },
            '\x1b' => skip_escape(&mut chars),
            _ if ch.is_control() => {},
            _ => out.push(ch),
        }
    }
    out
}

/// Consume the rest of an escape sequence after `ESC`.
fn skip_escape(chars: &mut impl Iterator<Item = char>) {
    // CSI: parameter and intermediate bytes up to a final byte in 0x40..=0x7E
    if chars.next() == Some('[') {
        for ch in chars.by_ref() {
            if ('\x40'..='\x7e').contains(&ch) {
                break;
            }
        }
    }
}

/// Reassembles complete lines from arbitrarily split byte chunks.
///
/// Multi-byte UTF-8 sequences and CR/LF pairs split across chunks are
/// handled. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending_bytes: Vec<u8>,
    partial: String,
    trailing_cr: bool,
}

impl LineAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes
            .extend_from_slice(chunk);
        let mut text = drain_utf8_lossy(&mut self.pending_bytes);

        // A CR ending the previous chunk already closed a line.
        if self.trailing_cr && text.starts_with('\n') {
            text.remove(0);
        }
        self.trailing_cr = text.ends_with('\r');

        // Lines are cleaned once complete so escapes split across chunks
        // are still removed whole.
        let mut lines = Vec::new();
        let mut chars = text
            .chars()
            .peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    self.flush_partial(&mut lines);
                },
                '\n' => self.flush_partial(&mut lines),
                _ => self
                    .partial
                    .push(ch),
            }
        }
        lines
    }

    /// Return the unterminated tail, if any, and reset.
    pub fn finish(&mut self) -> Option<String> {
        if !self
            .pending_bytes
            .is_empty()
        {
            self.partial
                .push('�');
            self.pending_bytes
                .clear();
        }
        self.trailing_cr = false;
        let mut lines = Vec::new();
        self.flush_partial(&mut lines);
        lines.pop()
    }

    fn flush_partial(&mut self, lines: &mut Vec<String>) {
        let line = clean_monitor_text(&std::mem::take(&mut self.partial));
        let line = line.trim_end();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_utf8_lossy_replaces_invalid_bytes_and_continues() {
        let mut buf = vec![0xFF, b'A', 0xFE, b'B'];
        let out = drain_utf8_lossy(&mut buf);
        assert_eq!(out, "�A�B");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_utf8_lossy_keeps_incomplete_suffix() {
        let mut buf = vec![0xE4, 0xBD]; // incomplete UTF-8 for '你'
        let out = drain_utf8_lossy(&mut buf);
        assert_eq!(out, "");
        assert_eq!(buf, vec![0xE4, 0xBD]);

        buf.push(0xA0);
        let out2 = drain_utf8_lossy(&mut buf);
        assert_eq!(out2, "你");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_clean_monitor_text_filters_control_chars() {
        let text = "A\x07B\x00C\tD\nE\rF\r\nG";
        let cleaned = clean_monitor_text(text);
        assert_eq!(cleaned, "ABC\tD\nE\nF\nG");
    }

    #[test]
    fn test_clean_monitor_text_strips_ansi_sequences() {
        assert_eq!(
            clean_monitor_text("\x1b[0;32mI (31) boot: ESP-IDF v5.1\x1b[0m"),
            "I (31) boot: ESP-IDF v5.1"
        );
        assert_eq!(clean_monitor_text("\x1b[2K\x1b[1Gok\x1bc"), "ok");
        assert_eq!(clean_monitor_text("cut\x1b[0;3"), "cut");
    }

    #[test]
    fn test_line_assembler_strips_colored_esp_idf_logs() {
        let mut lines = LineAssembler::new();
        assert_eq!(
            lines.push(b"\x1b[0;32mI (31) boot: ESP-IDF v5.1\x1b[0m\r\n"),
            vec!["I (31) boot: ESP-IDF v5.1"]
        );

        // Escape split across two reads
        assert!(lines.push(b"\x1b[0;3").is_empty());
        assert_eq!(
            lines.push(b"3mW (42) wifi: retry\x1b[0m\r\n"),
            vec!["W (42) wifi: retry"]
        );
    }

    #[test]
    fn test_line_assembler_splits_lines() {
        let mut lines = LineAssembler::new();
        assert_eq!(
            lines.push(b"rst:0x1 (POWERON)\r\nboot:0x13\r\n"),
            vec!["rst:0x1 (POWERON)", "boot:0x13"]
        );
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_line_assembler_joins_partial_chunks() {
        let mut lines = LineAssembler::new();
        assert!(lines.push(b"Hello, ").is_empty());
        assert_eq!(lines.push(b"Ideaboard\nnext"), vec!["Hello, Ideaboard"]);
        assert_eq!(lines.finish(), Some("next".to_string()));
    }

    #[test]
    fn test_line_assembler_crlf_split_across_chunks() {
        let mut lines = LineAssembler::new();
        assert_eq!(lines.push(b"one\r"), vec!["one"]);
        assert_eq!(lines.push(b"\ntwo\r\n"), vec!["two"]);
    }

    #[test]
    fn test_line_assembler_utf8_split_across_chunks() {
        let mut lines = LineAssembler::new();
        assert!(lines.push(&[0xE4, 0xBD]).is_empty());
        assert_eq!(lines.push(&[0xA0, b'\n']), vec!["你"]);
    }

    #[test]
    fn test_line_assembler_skips_blank_lines() {
        let mut lines = LineAssembler::new();
        assert_eq!(lines.push(b"\n\n  \nx\n"), vec!["x"]);
    }

    #[test]
    fn test_line_assembler_finish_flushes_dangling_bytes() {
        let mut lines = LineAssembler::new();
        assert!(lines.push(&[b'a', 0xE4]).is_empty());
        assert_eq!(lines.finish(), Some("a�".to_string()));
    }
}
