/*!
 * Interactive blinkdb Client
 *
 * Connects to a server, reads lines at a `blink> ` prompt, sends each as
 * a RESP-2 array of bulk strings, and prints the decoded reply. `exit` or
 * `quit` (any case) ends the session.
 */

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use blinkdb::protocol::{decode, encode_command, Frame};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Interactive client for blinkdb.
#[derive(Parser)]
#[command(name = "blink-cli", version, about, disable_help_flag = true)]
struct Args {
    /// Server hostname or IP.
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = blinkdb::DEFAULT_PORT)]
    port: u16,

    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .with_context(|| format!("could not connect to {}:{}", args.host, args.port))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .context("failed to set receive timeout")?;

    println!("Connected to blinkdb at {}:{}", args.host, args.port);
    println!("Type 'exit' or 'quit' to leave");

    run_repl(stream)
}

fn run_repl(mut stream: TcpStream) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("blink> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }

                let request = encode_command(&tokenize(line));
                if let Err(e) = stream.write_all(&request) {
                    eprintln!("Error: failed to send command: {}", e);
                    break;
                }

                match read_reply(&mut stream) {
                    Ok(frame) => println!("{}", format_reply(&frame)),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => bail!("readline failed: {}", e),
        }
    }

    Ok(())
}

/// Split a command line on whitespace, stripping one pair of surrounding
/// double quotes per token.
fn tokenize(line: &str) -> Vec<Vec<u8>> {
    line.split_whitespace()
        .map(|token| {
            let token = token
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(token);
            token.as_bytes().to_vec()
        })
        .collect()
}

/// Accumulate socket reads until one complete reply frame decodes.
fn read_reply(stream: &mut TcpStream) -> Result<Frame> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 64 * 1024];

    loop {
        if let Some((frame, _)) = decode(&buffer)? {
            return Ok(frame);
        }
        let n = stream.read(&mut chunk).context("no response from server")?;
        if n == 0 {
            bail!("server closed the connection");
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn format_reply(frame: &Frame) -> String {
    match frame {
        Frame::Simple(s) => s.clone(),
        Frame::Error(msg) => format!("Error: {}", msg),
        Frame::Integer(i) => i.to_string(),
        Frame::Bulk(payload) => String::from_utf8_lossy(payload).into_owned(),
        Frame::NullBulk | Frame::NullArray => "NULL".to_string(),
        Frame::Array(items) => format!("(Array with {} elements)", items.len()),
    }
}
