//! Subprocess lifecycle management shared by the command discoverer and the
//! command secret gatherer.
//!
//! The child is a scoped resource acquired at spawn and released on every
//! exit path. Stdout/stderr are drained on dedicated threads concurrently
//! with waiting on the child, so a chatty child can never deadlock on a full
//! pipe buffer while we're busy polling `try_wait`.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub struct Output {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `cmd` to completion, killing and reaping it if `timeout` elapses
/// first. Returns `Ok(None)` on timeout (the caller decides how to surface
/// that as a `Timeout` error with its own provider name).
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<Option<Output>> {
    let mut child: Child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");

    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(status.map(|s| Output { success: s.success(), stdout, stderr }))
}
