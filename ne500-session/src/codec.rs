//! Command codec
//!
//! Outbound commands are ASCII lines `"<addr> <VERB>[ <PARAM>]\r"`. Inbound
//! frames start with the two-digit address of the replying pump followed by
//! its prompt letter and, for queries, the reply data:
//!
//! ```text
//! 01S            stopped, command accepted
//! 01SI0.020W0.000ML
//!                stopped, DIS data
//! 01S?OOR        command data out of range
//! 01A?S          alarm: motor stalled
//! ```

use crate::frame::{Frame, CR, LF};
use crate::reply::Reply;
use bytes::{BufMut, Bytes, BytesMut};
use ne500_core::{
    Address, AlarmCode, Command, CommandErrorKind, PumpAddress, PumpError, PumpResult, PumpStatus, Verb,
};

/// Encode a command, terminator included
pub fn format(command: &Command) -> Bytes {
    format_raw(&command.to_string())
}

/// Encode raw command text
///
/// Any trailing CR/LF already present is replaced, so the result always ends
/// with exactly one carriage return.
pub fn format_raw(text: &str) -> Bytes {
    let text = text.trim_end_matches(['\r', '\n']);
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(CR);
    buf.freeze()
}

/// Encode a network command burst
///
/// Every command is followed by `*`; the whole burst shares one terminator,
/// e.g. `"01 RAT 100.0* 02 RAT 250.0* \r"`. Bursts address individual pumps,
/// so broadcast commands are rejected.
pub fn format_burst(commands: &[Command]) -> PumpResult<Bytes> {
    if commands.is_empty() {
        return Err(PumpError::InvalidParameter("command burst is empty".to_string()));
    }
    let mut buf = BytesMut::new();
    for command in commands {
        if command.address().is_broadcast() {
            return Err(PumpError::InvalidAddress(format!(
                "broadcast command {:?} cannot be part of a burst",
                command.to_string()
            )));
        }
        buf.put_slice(command.to_string().as_bytes());
        buf.put_slice(b"* ");
    }
    buf.put_u8(CR);
    Ok(buf.freeze())
}

/// Decode one command line as it appears on the wire
///
/// Accepts `"01 DIR INF"`, `"* RUN"`, `"*RUN"` and the RESET form
/// `"01 * RESET"`, with or without the terminator.
pub fn parse_command(line: &str) -> PumpResult<Command> {
    let line = line.trim_end_matches(['\r', '\n']).trim();

    let (address, rest) = match line.strip_prefix('*') {
        Some(rest) => (Address::Broadcast, rest),
        None => {
            let digits = line.find(|c: char| !c.is_ascii_digit()).unwrap_or(line.len());
            let value: u8 = line[..digits]
                .parse()
                .map_err(|_| PumpError::InvalidAddress(format!("no pump address in {:?}", line)))?;
            (Address::Pump(PumpAddress::new(value)?), &line[digits..])
        }
    };

    let mut tokens = rest.split_whitespace().peekable();
    if tokens.peek() == Some(&"*") {
        tokens.next();
    }
    let verb: Verb = tokens
        .next()
        .ok_or_else(|| PumpError::InvalidParameter(format!("no verb in {:?}", line)))?
        .parse()?;
    let param = tokens.collect::<Vec<_>>().join(" ");

    Command::new(address, verb, Some(param.as_str()))
}

/// Decode a command burst back into its commands
pub fn parse_burst(line: &str) -> PumpResult<Vec<Command>> {
    let line = line.trim_end_matches(['\r', '\n']).trim_end();
    let line = line
        .strip_suffix('*')
        .ok_or_else(|| PumpError::InvalidParameter(format!("not a command burst: {:?}", line)))?;
    line.split('*').map(parse_command).collect()
}

/// Sort a reply frame into a [`Reply`]
///
/// Precedence: alarm, then command error, then prompt, else plain data. An
/// alarm wins even when a status letter is also present.
pub fn classify(frame: &Frame) -> Reply {
    let body = frame.body_str();
    classify_text(strip_address(body.trim_end_matches([CR as char, LF as char])))
}

fn strip_address(text: &str) -> &str {
    match text.as_bytes() {
        [a, b, ..] if a.is_ascii_digit() && b.is_ascii_digit() => &text[2..],
        _ => text,
    }
}

fn classify_text(text: &str) -> Reply {
    if let Some(pos) = text.find("A?") {
        return Reply::Alarm(AlarmCode::from_code(text[pos + 2..].chars().next()));
    }
    if let Some(rest) = text.strip_prefix('A') {
        return Reply::Alarm(AlarmCode::from_code(rest.chars().next()));
    }

    if let Some(pos) = text.find('?') {
        let status = text[..pos].bytes().last().and_then(PumpStatus::from_prompt);
        let kind = CommandErrorKind::from_suffix(&text[pos + 1..]);
        return Reply::CommandError { status, kind };
    }

    match text.bytes().next().and_then(PumpStatus::from_prompt) {
        Some(status) if text.len() == 1 => Reply::Status(status),
        Some(status) => Reply::Data {
            status: Some(status),
            payload: text[1..].trim().to_string(),
        },
        None => Reply::Data {
            status: None,
            payload: text.trim().to_string(),
        },
    }
}
