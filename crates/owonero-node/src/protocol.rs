//! Newline-delimited text protocol.
//!
//! A connection opens with one greeting line from the server. The client then
//! sends one command per line; commands that take an argument accept it either
//! after a space on the same line or as the next line. Every command gets
//! exactly one reply line.

use std::ops::RangeInclusive;

use owonero_core::Block;
use serde::{Deserialize, Serialize};

use crate::constants::GREETING_PREFIX;
use crate::error::ProtocolError;

pub const OK: &str = "ok";
pub const SYNC_INITIATED: &str = "sync initiated";
pub const ERR_BLOCK_INVALID: &str = "error: block invalid";
pub const ERR_BAD_SIGNATURE: &str = "error: invalid transaction signature";
pub const ERR_INVALID_SHARE: &str = "error: invalid share";
pub const ERR_WALLET_NOT_FOUND: &str = "error: wallet not found";
pub const ERR_INTERNAL: &str = "error: node unavailable";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    GetChain,
    GetHeight,
    GetBlocks,
    SubmitBlock,
    SendTx,
    SubmitShare,
    GetPeers,
    AddPeer,
    RemovePeer,
    GetWallet,
    MinerActive,
    Sync,
    GetPending,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::GetChain,
        Command::GetHeight,
        Command::GetBlocks,
        Command::SubmitBlock,
        Command::SendTx,
        Command::SubmitShare,
        Command::GetPeers,
        Command::AddPeer,
        Command::RemovePeer,
        Command::GetWallet,
        Command::MinerActive,
        Command::Sync,
        Command::GetPending,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::GetChain => "getchain",
            Command::GetHeight => "getheight",
            Command::GetBlocks => "getblocks",
            Command::SubmitBlock => "submitblock",
            Command::SendTx => "sendtx",
            Command::SubmitShare => "submitshare",
            Command::GetPeers => "getpeers",
            Command::AddPeer => "addpeer",
            Command::RemovePeer => "removepeer",
            Command::GetWallet => "getwallet",
            Command::MinerActive => "mineractive",
            Command::Sync => "sync",
            Command::GetPending => "getpending",
        }
    }

    /// Whether the command carries an argument line.
    pub fn takes_payload(self) -> bool {
        matches!(
            self,
            Command::GetBlocks
                | Command::SubmitBlock
                | Command::SendTx
                | Command::SubmitShare
                | Command::AddPeer
                | Command::RemovePeer
                | Command::GetWallet
        )
    }

    /// Split a command line into the command and any inline argument.
    pub fn parse(line: &str) -> Result<(Command, Option<&str>), ProtocolError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, Some(r.trim()).filter(|r| !r.is_empty())),
            None => (line, None),
        };
        Command::ALL
            .into_iter()
            .find(|c| c.name() == word)
            .map(|c| (c, rest))
            .ok_or_else(|| ProtocolError::UnknownCommand(word.to_string()))
    }
}

pub fn unknown_command_reply() -> String {
    let names: Vec<&str> = Command::ALL.iter().map(|c| c.name()).collect();
    format!("unknown command. supported: {}", names.join(", "))
}

pub fn error_reply(e: &ProtocolError) -> String {
    match e {
        ProtocolError::UnknownCommand(_) => unknown_command_reply(),
        other => format!("error: {other}"),
    }
}

/// Heights travel as signed integers; an empty ledger is `-1`.
pub fn wire_height(height: Option<u64>) -> i64 {
    height.map_or(-1, |h| h as i64)
}

pub fn greeting(height: Option<u64>) -> String {
    format!("{GREETING_PREFIX}{}", wire_height(height))
}

pub fn parse_greeting(line: &str) -> Option<i64> {
    line.trim().strip_prefix(GREETING_PREFIX)?.parse().ok()
}

/// `"START END"`, inclusive, with `START <= END`.
pub fn parse_range(arg: &str) -> Result<RangeInclusive<u64>, ProtocolError> {
    let mut parts = arg.split_whitespace();
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ProtocolError::BadRange);
    };
    let start: u64 = start.parse().map_err(|_| ProtocolError::BadRange)?;
    let end: u64 = end.parse().map_err(|_| ProtocolError::BadRange)?;
    if start > end {
        return Err(ProtocolError::BadRange);
    }
    Ok(start..=end)
}

pub fn parse_json<T: for<'de> Deserialize<'de>>(
    what: &'static str,
    payload: &str,
) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::BadJson { what, source })
}

/// Pool-mode proof of partial work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub wallet: String,
    pub nonce: u64,
    pub attempts: u64,
    pub block: Block,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_inline_commands() {
        assert_eq!(Command::parse("getheight").unwrap(), (Command::GetHeight, None));
        assert_eq!(Command::parse("  getchain \r").unwrap(), (Command::GetChain, None));
        assert_eq!(
            Command::parse("getblocks 0 10").unwrap(),
            (Command::GetBlocks, Some("0 10"))
        );
        assert_eq!(
            Command::parse("addpeer   10.0.0.2:6969 ").unwrap(),
            (Command::AddPeer, Some("10.0.0.2:6969"))
        );
    }

    #[test]
    fn unknown_command_lists_supported() {
        let err = Command::parse("frobnicate").unwrap_err();
        let reply = error_reply(&err);
        assert!(reply.starts_with("unknown command. supported: "));
        for c in Command::ALL {
            assert!(reply.contains(c.name()));
        }
        assert!(Command::parse("").is_err());
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("3 7").unwrap(), 3..=7);
        assert_eq!(parse_range("5 5").unwrap(), 5..=5);
        assert!(parse_range("7 3").is_err());
        assert!(parse_range("1").is_err());
        assert!(parse_range("a b").is_err());
        assert!(parse_range("1 2 3").is_err());
        assert_eq!(
            error_reply(&parse_range("x").unwrap_err()),
            "error: invalid block range"
        );
    }

    #[test]
    fn greeting_round_trip() {
        assert_eq!(greeting(Some(5)), "owonero-daemon height=5");
        assert_eq!(greeting(None), "owonero-daemon height=-1");
        assert_eq!(parse_greeting("owonero-daemon height=12\n"), Some(12));
        assert_eq!(parse_greeting("hello"), None);
    }

    #[test]
    fn json_errors_name_the_payload() {
        let err = parse_json::<Block>("block", "{").unwrap_err();
        assert!(error_reply(&err).starts_with("error: cannot parse block json: "));
    }

    #[test]
    fn payload_commands() {
        assert!(Command::SubmitBlock.takes_payload());
        assert!(Command::GetWallet.takes_payload());
        assert!(!Command::GetHeight.takes_payload());
        assert!(!Command::MinerActive.takes_payload());
    }
}
