//! CLI utilities for FlyDB.
//!
//! The utilities in this module back the interactive `flydb-cli` shell.
use std::io::{self, BufRead, Write};

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `.exit`, or end of input
    Exit,
    /// `.ping`
    Ping,
    /// `.info`
    Info,
    /// `.begin`
    Begin,
    /// `.commit`
    Commit,
    /// `.rollback`
    Rollback,
    /// `.tables`
    Tables,
    /// SQL text sent to the server as-is
    Statement(String),
}

impl TryFrom<&str> for Command {
    type Error = String;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        match line.trim() {
            ".exit" | ".quit" => Ok(Command::Exit),
            ".ping" => Ok(Command::Ping),
            ".info" => Ok(Command::Info),
            ".begin" => Ok(Command::Begin),
            ".commit" => Ok(Command::Commit),
            ".rollback" => Ok(Command::Rollback),
            ".tables" => Ok(Command::Tables),
            s if !s.starts_with('.') => Ok(Command::Statement(s.to_string())),
            s => Err(format!("unrecognized command '{s}'")),
        }
    }
}

/// Prompts the user for a FlyDB command.
///
/// Returns `Ok(Err(..))` for input that is not a recognised command, and an
/// I/O error if the reader or writer fails.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> io::Result<Result<Command, String>>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "flydb> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Ok(Command::Exit));
    }
    Ok(Command::try_from(s.as_str()))
}
