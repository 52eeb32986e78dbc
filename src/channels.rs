//! Client-side channel and membership tracking.
//!
//! Consumes parsed membership/mode events (JOIN, PART, QUIT, KICK, NICK,
//! MODE, NAMES replies) and maintains per-channel user and mode sets. The
//! table is shared between a session's read-loop task and application
//! workers, so every handler runs under one lock scope: callers hold the
//! table's mutex for the whole event, never per sub-operation, and readers
//! that look at more than one field do the same.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::isupport::Isupport;
use crate::mode::ModeTable;

/// Channel mode recorded when a NAMES reply describes a secret channel.
const SECRET_MODE: char = 's';
/// Channel mode recorded when a NAMES reply describes a private channel.
const PRIVATE_MODE: char = 'p';

/// Tracked state for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    /// Channel name with the case it was first seen in.
    pub name: String,
    /// Nicknames in join/observation order, no duplicates.
    users: Vec<String>,
    /// `(mode letter, optional target)` pairs, deduplicated by full pair.
    modes: Vec<(char, Option<String>)>,
}

impl Channel {
    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn modes(&self) -> &[(char, Option<String>)] {
        &self.modes
    }

    pub fn has_user(&self, nick: &str) -> bool {
        self.users.iter().any(|u| u == nick)
    }

    fn add_user(&mut self, nick: &str) {
        if !self.has_user(nick) {
            self.users.push(nick.to_owned());
        }
    }

    /// Remove a user and every mode entry that targets them — one step, so
    /// readers under the table lock never see the half-applied state.
    fn remove_user(&mut self, nick: &str) {
        self.users.retain(|u| u != nick);
        self.modes.retain(|(_, target)| target.as_deref() != Some(nick));
    }

    fn add_mode(&mut self, mode: char, target: Option<String>) {
        if !self.modes.iter().any(|(m, t)| *m == mode && *t == target) {
            self.modes.push((mode, target));
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        for user in &mut self.users {
            if user == old {
                *user = new.to_owned();
            }
        }
        for (_, target) in &mut self.modes {
            if target.as_deref() == Some(old) {
                *target = Some(new.to_owned());
            }
        }
    }
}

/// RFC 1459 casemapping: names compare case-insensitively, with `[]\^` the
/// uppercase forms of `{}|~`.
fn fold(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '^' => '~',
            _ => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Every channel a session knows about, keyed by casefolded name.
///
/// Channels are created lazily by whichever event names them first and are
/// never dropped by the table itself — discarding an entry (say, after the
/// local user PARTs) is the embedding application's call via [`remove`].
///
/// [`remove`]: ChannelTable::remove
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: HashMap<String, Channel>,
}

/// The channel table as shared between the read-loop task and application
/// workers. Handlers never await while holding the lock.
pub type SharedChannels = Arc<Mutex<ChannelTable>>;

impl ChannelTable {
    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&fold(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Look up or lazily create a channel. Every handler goes through this,
    /// so an event naming an unseen channel creates it rather than failing.
    fn ensure(&mut self, name: &str) -> &mut Channel {
        self.channels.entry(fold(name)).or_insert_with(|| Channel {
            name: name.to_owned(),
            ..Channel::default()
        })
    }

    /// Discard a channel entry, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(&fold(name))
    }

    /// RPL_NAMREPLY: list type (`=` public, `@` secret, `*` private), the
    /// channel, and mark-prefixed nicknames. Marks are resolved through the
    /// session's PREFIX table.
    pub fn names_reply(
        &mut self,
        list_type: char,
        channel: &str,
        names: &[&str],
        isupport: &Isupport,
    ) {
        let entry = self.ensure(channel);
        match list_type {
            '@' => entry.add_mode(SECRET_MODE, None),
            '*' => entry.add_mode(PRIVATE_MODE, None),
            _ => {}
        }
        for name in names {
            let mut nick = *name;
            let mut marks = Vec::new();
            while let Some(c) = nick.chars().next() {
                match isupport.mark_to_mode(c) {
                    Some(mode) => {
                        marks.push(mode);
                        nick = &nick[c.len_utf8()..];
                    }
                    None => break,
                }
            }
            if nick.is_empty() {
                continue;
            }
            entry.add_user(nick);
            for mode in marks {
                entry.add_mode(mode, Some(nick.to_owned()));
            }
        }
    }

    pub fn join(&mut self, nick: &str, channel: &str) {
        self.ensure(channel).add_user(nick);
    }

    pub fn part(&mut self, nick: &str, channel: &str) {
        self.ensure(channel).remove_user(nick);
    }

    /// A QUIT removes the user from every channel we track.
    pub fn quit(&mut self, nick: &str) {
        for channel in self.channels.values_mut() {
            channel.remove_user(nick);
        }
    }

    /// KICK carries comma-separated channel and nick lists.
    pub fn kick(&mut self, channels: &str, nicks: &str) {
        for channel in channels.split(',') {
            let entry = self.ensure(channel);
            for nick in nicks.split(',') {
                entry.remove_user(nick);
            }
        }
    }

    /// Rename a nick everywhere: user lists and mode targets alike.
    pub fn rename_nick(&mut self, old: &str, new: &str) {
        for channel in self.channels.values_mut() {
            channel.rename(old, new);
        }
    }

    /// Apply a MODE change to a channel through the session's arity table:
    /// the negative bucket removes matching pairs, the positive bucket
    /// appends (deduplicated by full pair).
    pub fn apply_mode(&mut self, channel: &str, mode_str: &str, args: &[String], table: &ModeTable) {
        let changes = table.parse(mode_str, args);
        let entry = self.ensure(channel);
        for (mode, target) in &changes.negative {
            entry.modes.retain(|(m, t)| !(m == mode && t == target));
        }
        for (mode, target) in changes.positive {
            entry.add_mode(mode, target);
        }
    }
}
