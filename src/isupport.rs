//! RPL_ISUPPORT (numeric 005) capability tracking.
//!
//! One table per session, populated incrementally as 005 lines arrive. The
//! embedded mode arity table is rebuilt whenever the `CHANMODES` or `PREFIX`
//! keys are (re)observed; a malformed value keeps the previously-known table
//! instead of failing — capability noise is never fatal.

use std::collections::HashMap;

use tracing::warn;

use crate::mode::ModeTable;

/// Server capability table, fed by RPL_ISUPPORT.
#[derive(Debug, Clone)]
pub struct Isupport {
    /// Raw advertised tokens: key → value (empty string for bare flags).
    params: HashMap<String, String>,
    /// NAMES-reply mark → mode letter, in PREFIX order (e.g. `@`→`o`, `+`→`v`).
    prefix_marks: Vec<(char, char)>,
    /// Last good CHANMODES groups (A, B, C, D).
    chanmodes: [String; 4],
    /// Arity table derived from the two fields above.
    modes: ModeTable,
}

impl Default for Isupport {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
            prefix_marks: vec![('@', 'o'), ('+', 'v')],
            chanmodes: ["b".into(), "k".into(), "l".into(), "imnpst".into()],
            modes: ModeTable::default(),
        }
    }
}

impl Isupport {
    /// Ingest the parameters of one RPL_ISUPPORT message.
    ///
    /// `params[0]` is the client's own nick and the last parameter is the
    /// "are supported by this server" text; everything between is capability
    /// tokens (`KEY=value`, bare `KEY` flags, `-KEY` removals).
    pub fn observe(&mut self, params: &[String]) {
        if params.len() < 3 {
            return;
        }
        for token in &params[1..params.len() - 1] {
            if let Some(key) = token.strip_prefix('-') {
                self.params.remove(key);
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => self.set(key, value),
                None => self.set(token, ""),
            }
        }
    }

    /// Record one capability token, rebuilding the arity table when the
    /// CHANMODES or PREFIX keys change.
    pub fn set(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_owned(), value.to_owned());
        match key {
            "PREFIX" => match parse_prefix(value) {
                Some(marks) => {
                    self.prefix_marks = marks;
                    self.rebuild();
                }
                None => warn!(value, "isupport: unparseable PREFIX, keeping previous table"),
            },
            "CHANMODES" => match parse_chanmodes(value) {
                Some(groups) => {
                    self.chanmodes = groups;
                    self.rebuild();
                }
                None => warn!(value, "isupport: unparseable CHANMODES, keeping previous table"),
            },
            _ => {}
        }
    }

    fn rebuild(&mut self) {
        let prefix_modes: Vec<char> = self.prefix_marks.iter().map(|&(_, mode)| mode).collect();
        self.modes = ModeTable::from_isupport(&self.chanmodes, &prefix_modes);
    }

    /// Advertised value for a key, if any (empty string for bare flags).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The current mode arity table.
    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    /// Map a NAMES-reply prefix mark (`@`, `+`, ...) to its mode letter, or
    /// `None` for an unrecognized mark.
    pub fn mark_to_mode(&self, mark: char) -> Option<char> {
        self.prefix_marks
            .iter()
            .find(|&&(m, _)| m == mark)
            .map(|&(_, mode)| mode)
    }
}

/// `(modes)marks`, e.g. `(ov)@+`. An empty value legitimately means "no
/// status prefixes".
fn parse_prefix(value: &str) -> Option<Vec<(char, char)>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    let inner = value.strip_prefix('(')?;
    let (modes, marks) = inner.split_once(')')?;
    if modes.chars().count() != marks.chars().count() {
        return None;
    }
    Some(marks.chars().zip(modes.chars()).collect())
}

/// `A,B,C,D` — four comma-separated groups of mode letters. Servers may
/// append ircd-specific extra groups; those letters never take an argument,
/// which is what falling outside the table already means.
fn parse_chanmodes(value: &str) -> Option<[String; 4]> {
    let mut groups = value.split(',');
    let a = groups.next()?.to_owned();
    let b = groups.next()?.to_owned();
    let c = groups.next()?.to_owned();
    let d = groups.next()?.to_owned();
    Some([a, b, c, d])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tokens: &[&str]) -> Vec<String> {
        let mut out = vec!["wren".to_owned()];
        out.extend(tokens.iter().map(|t| (*t).to_owned()));
        out.push("are supported by this server".to_owned());
        out
    }

    #[test]
    fn observe_stores_values_and_flags() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["NETWORK=Estuary", "EXCEPTS", "MODES=4"]));
        assert_eq!(isupport.get("NETWORK"), Some("Estuary"));
        assert_eq!(isupport.get("EXCEPTS"), Some(""));
        assert_eq!(isupport.get("MODES"), Some("4"));
        assert_eq!(isupport.get("CASEMAPPING"), None);
    }

    #[test]
    fn observe_removes_negated_keys() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["EXCEPTS"]));
        assert_eq!(isupport.get("EXCEPTS"), Some(""));
        isupport.observe(&params(&["-EXCEPTS"]));
        assert_eq!(isupport.get("EXCEPTS"), None);
    }

    #[test]
    fn default_prefix_marks() {
        let isupport = Isupport::default();
        assert_eq!(isupport.mark_to_mode('@'), Some('o'));
        assert_eq!(isupport.mark_to_mode('+'), Some('v'));
        assert_eq!(isupport.mark_to_mode('~'), None);
    }

    #[test]
    fn prefix_advertisement_extends_marks() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["PREFIX=(qaov)~&@+"]));
        assert_eq!(isupport.mark_to_mode('~'), Some('q'));
        assert_eq!(isupport.mark_to_mode('&'), Some('a'));
        assert_eq!(isupport.mark_to_mode('@'), Some('o'));
        assert_eq!(isupport.mark_to_mode('+'), Some('v'));
    }

    #[test]
    fn chanmodes_advertisement_rebuilds_arity() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["CHANMODES=bdeIq,k,lfJD,cgijLmnPQrRstz"]));

        // Group C: argument on set only.
        let changes = isupport.modes().parse("+l", &["10".to_owned()]);
        assert_eq!(changes.positive, vec![('l', Some("10".to_owned()))]);
        let changes = isupport.modes().parse("-l", &[]);
        assert_eq!(changes.negative, vec![('l', None)]);

        // Group A still consumes on unset.
        let changes = isupport.modes().parse("-b", &["*!*@x".to_owned()]);
        assert_eq!(changes.negative, vec![('b', Some("*!*@x".to_owned()))]);
    }

    #[test]
    fn prefix_modes_feed_the_arity_table() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&[
            "CHANMODES=b,k,l,imnpst",
            "PREFIX=(qaov)~&@+",
        ]));
        let changes = isupport
            .modes()
            .parse("+q", &["founder".to_owned()]);
        assert_eq!(changes.positive, vec![('q', Some("founder".to_owned()))]);
    }

    #[test]
    fn malformed_values_keep_previous_table() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["PREFIX=(qaov)~&@+"]));

        // Garbage PREFIX and truncated CHANMODES must not clobber anything.
        isupport.observe(&params(&["PREFIX=broken", "CHANMODES=only,two"]));
        assert_eq!(isupport.mark_to_mode('~'), Some('q'));
        let changes = isupport.modes().parse("-l", &[]);
        assert_eq!(changes.negative, vec![('l', None)]);
    }

    #[test]
    fn empty_prefix_means_no_marks() {
        let mut isupport = Isupport::default();
        isupport.observe(&params(&["PREFIX="]));
        assert_eq!(isupport.mark_to_mode('@'), None);
    }

    #[test]
    fn short_message_is_ignored() {
        let mut isupport = Isupport::default();
        isupport.observe(&["wren".to_owned(), "trailing only".to_owned()]);
        assert_eq!(isupport.get("trailing only"), None);
    }
}
