//! Line-oriented diagnostic console
//!
//! Turns stdin lines into request packets for the dispatcher and prints the
//! responses. Simulated pins can be driven from the same prompt.
//!
//! ```text
//! play-channel 3 1            # channel 3, loop mode
//! play-file 1 0 "intro.wav"
//! set-channel-volume 1 u16:150
//! set-speakers-volume i16:-60
//! 0x20 3                      # raw command id
//! pin 4 0                     # drive pin 4 low
//! quit
//! ```

use crate::error::{Error, Result};
use crate::hal::sim::SimPins;
use crate::hal::PacketTransport;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;
use trigdeck_common::protocol::{Command, ErrorCode, Packet};

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Empty,
    Help,
    Quit,
    Packet(Packet),
    Pin { pin: u8, level: bool },
}

const HELP: &str = "\
commands: <name|0xNN> [args...] | pin <n> <0|1> | help | quit
args: decimal or 0xNN byte, u16:N, i16:N, \"text\"
names: hello version play-file play-channel stop stop-all pause pause-all
       resume resume-all channel-status channels-status get-channel-volume
       set-channel-volume get-speakers-volume set-speakers-volume
       get-headphone-volume set-headphone-volume";

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Text(String),
}

fn tokenize(line: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            break;
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => text.push(c),
                    None => return Err(Error::Console("unterminated string".to_string())),
                }
            }
            tokens.push(Token::Text(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' || c == '#' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }

    Ok(tokens)
}

fn parse_byte(word: &str) -> Result<u8> {
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => word.parse::<u8>(),
    };
    parsed.map_err(|_| Error::Console(format!("invalid byte '{}'", word)))
}

fn parse_arg(token: &Token, payload: &mut Vec<u8>) -> Result<()> {
    match token {
        Token::Text(text) => payload.extend_from_slice(text.as_bytes()),
        Token::Word(word) => {
            if let Some(value) = word.strip_prefix("u16:") {
                let value: u16 = value
                    .parse()
                    .map_err(|_| Error::Console(format!("invalid u16 '{}'", value)))?;
                payload.extend_from_slice(&value.to_le_bytes());
            } else if let Some(value) = word.strip_prefix("i16:") {
                let value: i16 = value
                    .parse()
                    .map_err(|_| Error::Console(format!("invalid i16 '{}'", value)))?;
                payload.extend_from_slice(&value.to_le_bytes());
            } else {
                payload.push(parse_byte(word)?);
            }
        }
    }
    Ok(())
}

/// Parse one console line
pub fn parse_line(line: &str) -> Result<ConsoleLine> {
    let tokens = tokenize(line)?;
    let Some((first, args)) = tokens.split_first() else {
        return Ok(ConsoleLine::Empty);
    };

    let Token::Word(name) = first else {
        return Err(Error::Console("expected a command".to_string()));
    };

    match name.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(ConsoleLine::Help),
        "quit" | "exit" => return Ok(ConsoleLine::Quit),
        "pin" => {
            let [Token::Word(pin), Token::Word(level)] = args else {
                return Err(Error::Console("usage: pin <n> <0|1>".to_string()));
            };
            let level = match level.as_str() {
                "0" | "low" => false,
                "1" | "high" => true,
                other => return Err(Error::Console(format!("invalid level '{}'", other))),
            };
            return Ok(ConsoleLine::Pin {
                pin: parse_byte(pin)?,
                level,
            });
        }
        _ => {}
    }

    let cmd = match Command::from_name(name) {
        Some(command) => command.id(),
        None => parse_byte(name).map_err(|_| Error::Console(format!("unknown command '{}'", name)))?,
    };

    let mut payload = Vec::new();
    for arg in args {
        parse_arg(arg, &mut payload)?;
    }

    Ok(ConsoleLine::Packet(Packet::new(cmd, payload)?))
}

/// Render a response packet for the console
pub fn format_packet(packet: &Packet) -> String {
    let name = Command::try_from(packet.cmd())
        .map(|command| format!("{:?}", command))
        .unwrap_or_else(|_| format!("0x{:02x}", packet.cmd()));
    let bytes: Vec<String> = packet
        .payload()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("<- {} [{}]", name, bytes.join(" "))
}

pub fn format_error(code: ErrorCode) -> String {
    format!("<- error: {}", code)
}

/// Packet transport fed by the console reader
pub struct ConsoleTransport {
    requests: mpsc::UnboundedReceiver<Packet>,
    replies: mpsc::UnboundedSender<String>,
}

/// Console-side ends of a [`ConsoleTransport`]
pub struct ConsoleHandle {
    pub requests: mpsc::UnboundedSender<Packet>,
    pub replies: mpsc::UnboundedReceiver<String>,
}

impl ConsoleTransport {
    pub fn channel() -> (Self, ConsoleHandle) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: request_rx,
                replies: reply_tx,
            },
            ConsoleHandle {
                requests: request_tx,
                replies: reply_rx,
            },
        )
    }

    /// Extra sender for console output that is not a protocol reply
    pub fn output(&self) -> mpsc::UnboundedSender<String> {
        self.replies.clone()
    }

    fn reply(&self, line: String) {
        emit(&self.replies, line);
    }
}

fn emit(output: &mpsc::UnboundedSender<String>, line: String) {
    if output.send(line).is_err() {
        debug!("Console output closed, dropping reply");
    }
}

impl PacketTransport for ConsoleTransport {
    fn pull_packet(&mut self) -> Option<Packet> {
        self.requests.try_recv().ok()
    }

    fn push_packet(&mut self, packet: &Packet) {
        self.reply(format_packet(packet));
    }

    fn send_error_code(&mut self, code: ErrorCode) {
        self.reply(format_error(code));
    }
}

/// Read console lines until `quit` or end of input
///
/// Packets go to `requests`; parse errors and help text go to `output`.
pub async fn read_commands<R>(
    reader: R,
    requests: mpsc::UnboundedSender<Packet>,
    output: mpsc::UnboundedSender<String>,
    pins: &SimPins,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                emit(&output, format!("error: {}", e));
                continue;
            }
        };

        match parsed {
            ConsoleLine::Empty => {}
            ConsoleLine::Help => {
                emit(&output, HELP.to_string());
            }
            ConsoleLine::Quit => break,
            ConsoleLine::Pin { pin, level } => {
                pins.set_level(pin, level);
                debug!("Console drove pin {} {}", pin, if level { "high" } else { "low" });
            }
            ConsoleLine::Packet(packet) => {
                if requests.send(packet).is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}
