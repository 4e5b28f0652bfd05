use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{ElastixError, Result};
use crate::progress::OutputRelay;

/// Run an external tool to completion, feeding its stdout and stderr lines
/// through `relay` as they arrive.
///
/// Blocks until the process exits. A non-zero exit status becomes
/// [`ElastixError::ProcessFailed`] carrying everything the tool printed.
pub fn run_tool(mut cmd: Command, relay: &mut OutputRelay) -> Result<()> {
    let tool = Path::new(cmd.get_program())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cmd.get_program().to_string_lossy().into_owned());
    debug!(command = ?cmd, "Spawning {}", tool);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ElastixError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to start {}: {}", tool, e),
            ))
        })?;

    relay.reset();
    relay.reporter().begin(&tool);

    let (tx, rx) = mpsc::channel();
    let readers = [
        child.stdout.take().map(|s| spawn_reader(s, tx.clone())),
        child.stderr.take().map(|s| spawn_reader(s, tx)),
    ];

    // Ends once both reader threads hang up.
    for line in rx {
        relay.feed(&line);
    }
    for handle in readers.into_iter().flatten() {
        let _ = handle.join();
    }

    let status = child.wait()?;
    relay.reporter().finish();
    debug!(%status, "{} exited", tool);

    if !status.success() {
        return Err(ElastixError::ProcessFailed {
            tool,
            code: status.code(),
            output: relay.captured().to_string(),
        });
    }
    Ok(())
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
