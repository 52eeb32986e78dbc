//! IRC message parsing and serialization.
//!
//! Implements the RFC 2812 message format:
//!   [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
//!
//! Messages are terminated by CR-LF (`\r\n`) on the wire, but parsing
//! operates on the content without the terminator. The grammar here is
//! deliberately lenient where real networks are: prefixes may contain any
//! non-space bytes (multi-byte nicks exist in the wild), runs of spaces
//! between parameters are tolerated, and so is stray whitespace before the
//! terminator.

use std::borrow::Cow;
use std::fmt;

/// RFC 2812 allows at most 15 parameters: 14 middles plus the trailing one.
const MAX_MIDDLE_PARAMS: usize = 14;

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server name or `nick!user@host`).
    pub prefix: Option<String>,
    /// The command (e.g. `PRIVMSG`, `001`, `NICK`).
    pub command: String,
    /// Parameters — the last may have been a trailing param (with spaces).
    pub params: Vec<String>,
}

/// Errors that can occur during message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("prefix present but missing command")]
    MissingCommand,
    #[error("command must be alphabetic or exactly three digits: {0:?}")]
    InvalidCommand(String),
}

impl Message {
    /// Build a message from borrowed parts — the shape `post` uses.
    pub fn new(prefix: Option<&str>, command: &str, params: &[&str]) -> Self {
        Self {
            prefix: prefix.map(str::to_owned),
            command: command.to_owned(),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Parse a single IRC message from a line (without the trailing `\r\n`;
    /// one is tolerated if present).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim_end_matches(['\r', '\n']);

        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = if let Some(stripped) = input.strip_prefix(':') {
            // Prefix runs until the first space. Anything non-space is
            // accepted — nick validation is not the codec's business.
            match stripped.find(' ') {
                Some(idx) => (Some(stripped[..idx].to_owned()), &stripped[idx + 1..]),
                None => return Err(ParseError::MissingCommand),
            }
        } else {
            (None, input)
        };
        let rest = rest.trim_start_matches(' ');

        // Split into command and parameter portion.
        let (command, param_str) = match rest.find(' ') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        let alphabetic = command.chars().all(|c| c.is_ascii_alphabetic());
        let numeric = command.len() == 3 && command.chars().all(|c| c.is_ascii_digit());
        if !alphabetic && !numeric {
            return Err(ParseError::InvalidCommand(command.to_owned()));
        }

        let mut params = Vec::new();
        let mut remaining = param_str;
        loop {
            // Tolerate runs of spaces between tokens and stray whitespace
            // before the terminator.
            remaining = remaining.trim_start_matches(' ');
            if remaining.is_empty() {
                break;
            }
            if let Some(trailing) = remaining.strip_prefix(':') {
                // Trailing parameter: everything after the colon, verbatim.
                params.push(trailing.to_owned());
                break;
            }
            if params.len() == MAX_MIDDLE_PARAMS {
                // After 14 middles the rest is the trailing parameter even
                // without a colon to introduce it.
                params.push(remaining.to_owned());
                break;
            }
            match remaining.find(' ') {
                Some(idx) => {
                    params.push(remaining[..idx].to_owned());
                    remaining = &remaining[idx + 1..];
                }
                None => {
                    params.push(remaining.to_owned());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: command.to_owned(),
            params,
        })
    }

    /// Serialize to the IRC wire format (without trailing `\r\n`).
    ///
    /// The last parameter gets a `:` only when it needs one (empty, contains
    /// a space, or starts with `:`), so `parse(m.to_wire()) == m` holds.
    /// Embedded CR/LF in parameters is normalized to a space — a message
    /// value can never smuggle a second line onto the wire.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();

        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        if let Some((last, middles)) = self.params.split_last() {
            for param in middles {
                out.push(' ');
                out.push_str(&sanitize(param));
            }
            let last = sanitize(last);
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                out.push_str(" :");
            } else {
                out.push(' ');
            }
            out.push_str(&last);
        }

        out
    }

    /// The parsed view of this message's prefix, if it has one.
    pub fn source(&self) -> Option<Prefix> {
        self.prefix.as_deref().map(Prefix::parse)
    }

    /// Just the nick (or server name) portion of the prefix.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split(['!', '@']).next().unwrap_or(p))
    }

    /// Whether the text parameter (conventionally `params[1]`) carries a
    /// CTCP payload: non-empty and 0x01-delimited on both ends.
    pub fn is_ctcp(&self) -> bool {
        self.params
            .get(1)
            .is_some_and(|text| text.len() >= 2 && text.starts_with('\u{1}') && text.ends_with('\u{1}'))
    }
}

/// Replace embedded CR/LF with a single space. Output-side injection guard;
/// everything else in a parameter is the caller's contract.
fn sanitize(param: &str) -> Cow<'_, str> {
    if param.contains(['\r', '\n']) {
        Cow::Owned(param.replace("\r\n", " ").replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(param)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Derived view over a message prefix: `nick[!user@host]` or a bare server
/// name. `user` and `host` are absent for a bare nick or a server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    /// Split a raw prefix. Never fails — a string with no `!`/`@` structure
    /// is a bare nick or server name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((left, host)) => match left.split_once('!') {
                Some((nick, user)) => Self {
                    nick: nick.to_owned(),
                    user: Some(user.to_owned()),
                    host: Some(host.to_owned()),
                },
                None => Self {
                    nick: left.to_owned(),
                    user: None,
                    host: Some(host.to_owned()),
                },
            },
            None => Self {
                nick: raw.to_owned(),
                user: None,
                host: None,
            },
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nick)?;
        if let Some(ref user) = self.user {
            write!(f, "!{user}")?;
        }
        if let Some(ref host) = self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}
