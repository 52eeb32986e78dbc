//! MODE argument parsing against a runtime-configurable arity table.
//!
//! Whether a mode letter consumes one of the trailing arguments is not fixed
//! by the RFC — servers advertise it through ISUPPORT (`CHANMODES`, `PREFIX`),
//! so the table here starts from the RFC 1459 baseline and is rebuilt whenever
//! the isupport module observes new advertisements.

use std::collections::HashSet;

/// A parsed set of mode changes, split by polarity. Order within each bucket
/// is append order from the mode string, never sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeChanges {
    pub positive: Vec<(char, Option<String>)>,
    pub negative: Vec<(char, Option<String>)>,
}

/// Argument arity for mode letters.
///
/// CHANMODES group C letters (argument on set, none on unset) are a distinct
/// rule rather than a flag on the blanket table — folding them in would
/// silently misalign argument positions for `-` changes.
#[derive(Debug, Clone)]
pub struct ModeTable {
    /// Letters that consume an argument on both set and unset.
    with_arg: HashSet<char>,
    /// Letters that consume an argument only when being set (group C).
    with_arg_on_set: HashSet<char>,
    /// Every letter the table recognizes.
    known: HashSet<char>,
}

impl Default for ModeTable {
    /// RFC 1459 baseline: `o v b k` take an argument, `l` only when set,
    /// `i m n p s t` never.
    fn default() -> Self {
        let mut table = Self {
            with_arg: HashSet::new(),
            with_arg_on_set: HashSet::new(),
            known: HashSet::new(),
        };
        table.with_arg.extend("ovbk".chars());
        table.with_arg_on_set.insert('l');
        table.known.extend("ovbklimnpst".chars());
        table
    }
}

impl ModeTable {
    /// Rebuild from ISUPPORT data: the four CHANMODES groups plus the
    /// membership mode letters from PREFIX (which always take a nick).
    ///
    /// Groups A and B always take an argument, group C only on set, group D
    /// never.
    pub fn from_isupport(groups: &[String; 4], prefix_modes: &[char]) -> Self {
        let mut table = Self {
            with_arg: HashSet::new(),
            with_arg_on_set: HashSet::new(),
            known: HashSet::new(),
        };
        for c in groups[0]
            .chars()
            .chain(groups[1].chars())
            .chain(prefix_modes.iter().copied())
        {
            table.with_arg.insert(c);
            table.known.insert(c);
        }
        for c in groups[2].chars() {
            table.with_arg_on_set.insert(c);
            table.known.insert(c);
        }
        table.known.extend(groups[3].chars());
        table
    }

    pub fn is_known(&self, mode: char) -> bool {
        self.known.contains(&mode)
    }

    /// Parse a MODE change string with its positional arguments.
    ///
    /// `+`/`-` switch the current bucket; argument-taking letters consume the
    /// next unused argument left to right, one per occurrence. Unknown
    /// letters are kept with no argument rather than rejected, so ircd
    /// extensions pass through untouched.
    pub fn parse(&self, mode_str: &str, args: &[String]) -> ModeChanges {
        let mut changes = ModeChanges::default();
        let mut positive = true;
        let mut next_arg = 0;

        for c in mode_str.chars() {
            match c {
                '+' => positive = true,
                '-' => positive = false,
                _ => {
                    let takes_arg = self.with_arg.contains(&c)
                        || (positive && self.with_arg_on_set.contains(&c));
                    let arg = if takes_arg {
                        let arg = args.get(next_arg).cloned();
                        next_arg += 1;
                        arg
                    } else {
                        None
                    };
                    let bucket = if positive {
                        &mut changes.positive
                    } else {
                        &mut changes.negative
                    };
                    bucket.push((c, arg));
                }
            }
        }

        changes
    }
}
