use anyhow::{Context, Result, bail};
use std::io::{ErrorKind, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Exit status and captured text of a finished child process.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Whichever of stdout/stderr has content after trimming, stdout first.
    pub fn text(&self) -> &str {
        let out = self.stdout.trim();
        if out.is_empty() {
            self.stderr.trim()
        } else {
            out
        }
    }
}

/// Grace period for collecting output after the child exits, even when the
/// deadline has already passed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// A chunk read from one of the child's pipes; `None` marks end of stream.
type Piece = (Stream, Option<Vec<u8>>);

/// Run `cmd` to completion, capturing both streams, killing it once
/// `timeout` elapses.
///
/// The deadline also bounds output collection: a child that exits while a
/// background process of its own still holds the pipes open returns with
/// whatever was read by then.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Captured> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to launch {}", program))?;

    let (tx, rx) = mpsc::channel::<Piece>();
    let mut open = 0;
    if let Some(r) = child.stdout.take() {
        drain(r, Stream::Out, tx.clone());
        open += 1;
    }
    if let Some(r) = child.stderr.take() {
        drain(r, Stream::Err, tx.clone());
        open += 1;
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            bail!("{} timed out after {}s", program, timeout.as_secs());
        }
        thread::sleep(Duration::from_millis(25));
    };

    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    while open > 0 {
        let left = deadline
            .saturating_duration_since(Instant::now())
            .max(DRAIN_GRACE);
        match rx.recv_timeout(left) {
            Ok((Stream::Out, Some(bytes))) => stdout.extend_from_slice(&bytes),
            Ok((Stream::Err, Some(bytes))) => stderr.extend_from_slice(&bytes),
            Ok((_, None)) => open -= 1,
            Err(RecvTimeoutError::Timeout) => {
                debug!("{} exited but its output is still held open", program);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(Captured {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn drain<R: Read + Send + 'static>(mut r: R, stream: Stream, tx: Sender<Piece>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match r.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, Some(buf[..n].to_vec()))).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send((stream, None));
    });
}
