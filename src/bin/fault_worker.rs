//! Out-of-process elevation worker
//!
//! Reads `WorkerCommand` JSON lines from stdin and answers each with
//! `{"type":"status"}` then `{"type":"result",...}` on stdout. Logs go to
//! stderr so stdout carries protocol lines only.

use std::io::{self, BufRead, Write};
use std::process;

use tracing::{debug, error};

use fault_terrain::protocol::{WorkerCommand, WorkerReply};
use fault_terrain::worker::handle_command;
use fault_terrain::{init_logging, Result};

fn send(out: &mut impl Write, reply: &WorkerReply) -> Result<()> {
    writeln!(out, "{}", reply.to_json()?)?;
    out.flush()?;
    Ok(())
}

fn serve() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = WorkerCommand::from_json(&line)?;
        debug!(?command, "command received");

        let mut out = stdout.lock();
        let mut write_error = None;
        handle_command(&command, |reply| {
            if write_error.is_none() {
                write_error = send(&mut out, &reply).err();
            }
        })?;
        if let Some(err) = write_error {
            return Err(err);
        }
    }
    Ok(())
}

fn main() {
    init_logging();
    if let Err(err) = serve() {
        error!(error = %err, "worker failed");
        process::exit(1);
    }
}
