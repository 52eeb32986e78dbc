//! Command-name dispatch support shared by both session roles.
//!
//! Numeric replies resolve through a fixed numeric→symbolic table and
//! alphabetic commands dispatch under their uppercased name. Each role's
//! engine then matches the resolved name against its events trait in one
//! explicit `match` — there is no reflection or by-name lookup anywhere.

use std::borrow::Cow;

use crate::message::Message;

/// Instructions a session task accepts from other workers: queue a message
/// for the socket, or close the connection (the sole cancellation mechanism).
#[derive(Debug)]
pub(crate) enum Control {
    Send(Message),
    Close,
}

/// The name a command token dispatches under: the symbolic name for a
/// recognized numeric, otherwise the command itself uppercased.
pub fn resolved_name(command: &str) -> Cow<'static, str> {
    match numeric_name(command) {
        Some(sym) => Cow::Borrowed(sym),
        None => Cow::Owned(command.to_ascii_uppercase()),
    }
}

/// Resolve a numeric reply code to its symbolic name.
///
/// Covers the RFC 2812 command responses plus the error replies clients
/// commonly meet; an unlisted numeric simply dispatches to the unknown-
/// message hook, which is not an error.
pub fn numeric_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "001" => "RPL_WELCOME",
        "002" => "RPL_YOURHOST",
        "003" => "RPL_CREATED",
        "004" => "RPL_MYINFO",
        "005" => "RPL_ISUPPORT",
        "301" => "RPL_AWAY",
        "305" => "RPL_UNAWAY",
        "306" => "RPL_NOWAWAY",
        "311" => "RPL_WHOISUSER",
        "312" => "RPL_WHOISSERVER",
        "313" => "RPL_WHOISOPERATOR",
        "315" => "RPL_ENDOFWHO",
        "317" => "RPL_WHOISIDLE",
        "318" => "RPL_ENDOFWHOIS",
        "319" => "RPL_WHOISCHANNELS",
        "321" => "RPL_LISTSTART",
        "322" => "RPL_LIST",
        "323" => "RPL_LISTEND",
        "324" => "RPL_CHANNELMODEIS",
        "331" => "RPL_NOTOPIC",
        "332" => "RPL_TOPIC",
        "333" => "RPL_TOPICWHOTIME",
        "341" => "RPL_INVITING",
        "352" => "RPL_WHOREPLY",
        "353" => "RPL_NAMREPLY",
        "366" => "RPL_ENDOFNAMES",
        "372" => "RPL_MOTD",
        "375" => "RPL_MOTDSTART",
        "376" => "RPL_ENDOFMOTD",
        "401" => "ERR_NOSUCHNICK",
        "403" => "ERR_NOSUCHCHANNEL",
        "404" => "ERR_CANNOTSENDTOCHAN",
        "421" => "ERR_UNKNOWNCOMMAND",
        "431" => "ERR_NONICKNAMEGIVEN",
        "432" => "ERR_ERRONEUSNICKNAME",
        "433" => "ERR_NICKNAMEINUSE",
        "441" => "ERR_USERNOTINCHANNEL",
        "442" => "ERR_NOTONCHANNEL",
        "451" => "ERR_NOTREGISTERED",
        "461" => "ERR_NEEDMOREPARAMS",
        "462" => "ERR_ALREADYREGISTRED",
        "464" => "ERR_PASSWDMISMATCH",
        "471" => "ERR_CHANNELISFULL",
        "473" => "ERR_INVITEONLYCHAN",
        "474" => "ERR_BANNEDFROMCHAN",
        "475" => "ERR_BADCHANNELKEY",
        "482" => "ERR_CHANOPRIVSNEEDED",
        _ => return None,
    })
}
