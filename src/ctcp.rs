//! CTCP quoting — the out-of-band extension format carried inside a
//! PRIVMSG/NOTICE text parameter.
//!
//! Two quoting layers, applied in order on encode and reversed on decode:
//! a backslash layer so the payload can contain the 0x01 delimiter itself,
//! then a low-level 0x10 layer for the bytes the IRC transport cannot carry
//! (NUL, CR, LF). `decode(encode(s)) == s` for any payload.

/// CTCP message delimiter.
const DELIM: char = '\u{1}';
/// Low-level quote character.
const QUOTE: char = '\u{10}';

/// Quote a payload and wrap it in 0x01 delimiters.
pub fn encode(text: &str) -> String {
    // The backslash layer runs first, but its output (`\\` and `\a`) never
    // contains low-quoted bytes, so a single pass covers both layers.
    let mut out = String::with_capacity(text.len() + 2);
    out.push(DELIM);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            DELIM => out.push_str("\\a"),
            QUOTE => {
                out.push(QUOTE);
                out.push(QUOTE);
            }
            '\0' => {
                out.push(QUOTE);
                out.push('0');
            }
            '\r' => {
                out.push(QUOTE);
                out.push('r');
            }
            '\n' => {
                out.push(QUOTE);
                out.push('n');
            }
            other => out.push(other),
        }
    }
    out.push(DELIM);
    out
}

/// Strip the delimiters and reverse both quoting layers.
///
/// Unknown escape pairs keep their second character rather than failing —
/// the decoder is as permissive as the rest of the wire handling.
pub fn decode(text: &str) -> String {
    let text = text.strip_prefix(DELIM).unwrap_or(text);
    let text = text.strip_suffix(DELIM).unwrap_or(text);

    // Low-level 0x10 layer first — the inverse order of encode.
    let mut dequoted = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == QUOTE {
            match chars.next() {
                Some('0') => dequoted.push('\0'),
                Some('r') => dequoted.push('\r'),
                Some('n') => dequoted.push('\n'),
                Some(QUOTE) => dequoted.push(QUOTE),
                Some(other) => dequoted.push(other),
                None => {}
            }
        } else {
            dequoted.push(c);
        }
    }

    // Then the backslash layer.
    let mut out = String::with_capacity(dequoted.len());
    let mut chars = dequoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('a') => out.push(DELIM),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wraps_in_delimiters() {
        assert_eq!(encode("VERSION"), "\u{1}VERSION\u{1}");
    }

    #[test]
    fn encode_quotes_delimiter_and_backslash() {
        assert_eq!(encode("a\\b"), "\u{1}a\\\\b\u{1}");
        assert_eq!(encode("a\u{1}b"), "\u{1}a\\ab\u{1}");
    }

    #[test]
    fn encode_low_quotes_transport_bytes() {
        assert_eq!(encode("a\r\nb"), "\u{1}a\u{10}r\u{10}nb\u{1}");
        assert_eq!(encode("a\0b"), "\u{1}a\u{10}0b\u{1}");
        assert_eq!(encode("a\u{10}b"), "\u{1}a\u{10}\u{10}b\u{1}");
    }

    #[test]
    fn decode_plain_payload() {
        assert_eq!(decode("\u{1}PING 12345\u{1}"), "PING 12345");
    }

    #[test]
    fn decode_tolerates_missing_delimiters() {
        assert_eq!(decode("VERSION"), "VERSION");
    }

    #[test]
    fn decode_unknown_escape_keeps_character() {
        assert_eq!(decode("\u{1}a\\zb\u{1}"), "azb");
    }

    #[test]
    fn roundtrip_control_characters() {
        let payloads = [
            "",
            "ACTION waves",
            "null \0 inside",
            "delim \u{1} inside",
            "newline \n and return \r",
            "quote \u{10} and backslash \\",
            "\0\u{1}\n\r\u{10}\\",
            "mixed \\a literal and \u{10}0 literal",
        ];
        for payload in payloads {
            assert_eq!(decode(&encode(payload)), payload, "{payload:?}");
        }
    }
}
