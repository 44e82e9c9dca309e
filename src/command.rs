/*!
 * Command Parsing and Dispatch
 *
 * Requests arrive as arrays of bulk strings; the first element names the
 * command (case-insensitively) and the rest are raw byte arguments. The
 * command set is fixed, so the registry is a tagged enum plus one dispatch
 * match. Arity and argument errors become `-ERR` replies that leave the
 * connection open; only malformed framing (handled upstream) closes it.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::protocol::{resp_bulk, resp_error, resp_integer, resp_null, resp_simple};
use crate::store::StorageEngine;

/// A fully parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// SET key value [EX seconds]
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    /// GET key
    Get { key: Vec<u8> },
    /// DEL key
    Del { key: Vec<u8> },
}

/// Why a well-framed request could not be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Argument count does not match the named command.
    WrongArity(&'static str),
    /// The EX argument of SET was not a non-negative integer.
    InvalidExpire,
    /// The command name is not SET, GET or DEL.
    UnknownCommand(String),
}

impl CommandError {
    /// Render as the error reply sent to the client.
    pub fn into_reply(self) -> Vec<u8> {
        match self {
            CommandError::WrongArity(name) => resp_error(&format!(
                "ERR wrong number of arguments for '{}' command",
                name
            )),
            CommandError::InvalidExpire => {
                resp_error("ERR invalid expire time in 'set' command")
            }
            CommandError::UnknownCommand(name) => {
                resp_error(&format!("ERR unknown command '{}'", name))
            }
        }
    }
}

impl Cmd {
    /// Lift a request array into a command. `items` is the decoded array
    /// of bulk strings, command name first; the name is matched after
    /// ASCII-uppercasing.
    pub fn parse(mut items: Vec<Vec<u8>>) -> Result<Cmd, CommandError> {
        let Some(first) = items.first() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let name = first.to_ascii_uppercase();
        match name.as_slice() {
            b"SET" => {
                if items.len() < 3 {
                    return Err(CommandError::WrongArity("set"));
                }
                let ttl = if items.len() >= 5 && items[3].eq_ignore_ascii_case(b"EX") {
                    Some(parse_expire(&items[4])?)
                } else {
                    None
                };
                let value = items.swap_remove(2);
                let key = items.swap_remove(1);
                Ok(Cmd::Set { key, value, ttl })
            }
            b"GET" => {
                if items.len() != 2 {
                    return Err(CommandError::WrongArity("get"));
                }
                Ok(Cmd::Get {
                    key: items.swap_remove(1),
                })
            }
            b"DEL" => {
                if items.len() != 2 {
                    return Err(CommandError::WrongArity("del"));
                }
                Ok(Cmd::Del {
                    key: items.swap_remove(1),
                })
            }
            _ => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(&name).into_owned(),
            )),
        }
    }
}

/// Parse the EX seconds argument: decimal digits only, no sign.
fn parse_expire(raw: &[u8]) -> Result<Duration, CommandError> {
    if raw.is_empty() {
        return Err(CommandError::InvalidExpire);
    }
    let mut secs: u64 = 0;
    for &b in raw {
        if !b.is_ascii_digit() {
            return Err(CommandError::InvalidExpire);
        }
        secs = secs
            .checked_mul(10)
            .and_then(|n| n.checked_add((b - b'0') as u64))
            .ok_or(CommandError::InvalidExpire)?;
    }
    // Bound keeps the expiry instant arithmetic in range
    if secs > i32::MAX as u64 {
        return Err(CommandError::InvalidExpire);
    }
    Ok(Duration::from_secs(secs))
}

/// Executes commands against the shared engine and renders replies.
///
/// The engine mutex is the single serialization point shared with the
/// sweeper thread; each command holds it for one operation.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<Mutex<StorageEngine>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Mutex<StorageEngine>>) -> Self {
        Self { engine }
    }

    /// Run one request array end to end, always producing reply bytes.
    /// Parse failures become their `-ERR` replies; an execution failure
    /// surfaces as `-ERR internal error: <what>` and the connection lives
    /// on.
    pub fn dispatch(&self, items: Vec<Vec<u8>>) -> Vec<u8> {
        let cmd = match Cmd::parse(items) {
            Ok(cmd) => cmd,
            Err(err) => return err.into_reply(),
        };
        match self.execute(cmd) {
            Ok(reply) => reply,
            Err(err) => resp_error(&format!("ERR internal error: {}", err)),
        }
    }

    fn execute(&self, cmd: Cmd) -> Result<Vec<u8>> {
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| anyhow!("storage lock poisoned"))?;

        Ok(match cmd {
            Cmd::Set { key, value, ttl } => {
                engine.set(key, value, ttl);
                resp_simple("OK")
            }
            Cmd::Get { key } => match engine.get(&key) {
                Some(value) => resp_bulk(&value),
                None => resp_null(),
            },
            Cmd::Del { key } => resp_integer(engine.del(&key) as i64),
        })
    }
}
