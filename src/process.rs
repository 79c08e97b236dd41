//! Child process execution.
//!
//! Both output streams of a child go into one pipe, so stdout and stderr
//! interleave in the order the child wrote them. A drain thread copies the
//! pipe into a shared buffer; the final output is read only after that
//! thread has been joined.

use std::io::{self, Read};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::args::Invocation;
use crate::errors::HarnessError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run to completion with output discarded; only the outcome is reported.
pub fn run_status(inv: &Invocation, timeout: Option<Duration>) -> Result<(), HarnessError> {
    let mut cmd = inv.command();
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    let mut child = cmd.spawn().map_err(|source| launch_error(inv, source))?;
    debug!(pid = child.id(), program = %inv.program.display(), "Spawned child (output discarded)");
    let status = wait_child(&mut child, timeout)?;
    check_status(status)
}

/// Run to completion and return the merged output alongside the outcome.
pub fn run_with_output(inv: &Invocation, timeout: Option<Duration>) -> (String, Result<(), HarnessError>) {
    match OutputStream::spawn(inv, timeout) {
        Ok(stream) => stream.wait(),
        Err(e) => (String::new(), Err(e)),
    }
}

/// A running child whose merged output is being collected.
#[derive(Debug)]
pub struct OutputStream {
    child: Child,
    buffer: Arc<Mutex<Vec<u8>>>,
    drain: Option<JoinHandle<io::Result<u64>>>,
    timeout: Option<Duration>,
}

impl OutputStream {
    /// Launch `inv` with stdout and stderr sharing one pipe.
    pub fn spawn(inv: &Invocation, timeout: Option<Duration>) -> Result<Self, HarnessError> {
        let (reader, writer) = io::pipe().map_err(|e| HarnessError::io("create output pipe", e))?;
        let writer_err = writer
            .try_clone()
            .map_err(|e| HarnessError::io("clone output pipe", e))?;

        let mut cmd = inv.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_err));
        let child = cmd.spawn().map_err(|source| launch_error(inv, source))?;
        // Our copies of the write end live in `cmd`; dropping it leaves the child as the only writer,
        // so the drain sees EOF once the child exits.
        drop(cmd);
        debug!(pid = child.id(), program = %inv.program.display(), "Spawned child (streaming)");

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let drain = thread::Builder::new()
            .name(format!("cmd-harness-drain-{}", child.id()))
            .spawn(move || drain_into(reader, &sink))
            .map_err(|e| HarnessError::io("spawn drain thread", e))?;

        Ok(Self {
            child,
            buffer,
            drain: Some(drain),
            timeout,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Output collected so far. May be partial while the child runs.
    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Non-blocking check whether the child is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for exit, then for the drain to finish, and return the complete output.
    pub fn wait(mut self) -> (String, Result<(), HarnessError>) {
        let status = match wait_child(&mut self.child, self.timeout) {
            Ok(status) => status,
            Err(e) => {
                // A killed child may have left grandchildren holding the pipe open;
                // detach the drain rather than block on it.
                self.drain.take();
                return (self.output(), Err(e));
            }
        };
        let result = match self.join_drain() {
            Ok(bytes) => {
                debug!(bytes, %status, "Child finished");
                check_status(status)
            }
            Err(e) => Err(e),
        };
        (self.output(), result)
    }

    fn join_drain(&mut self) -> Result<u64, HarnessError> {
        let Some(handle) = self.drain.take() else {
            return Ok(0);
        };
        match handle.join() {
            Ok(res) => res.map_err(|e| HarnessError::io("read child output", e)),
            Err(_) => Err(HarnessError::io(
                "read child output",
                io::Error::other("drain thread panicked"),
            )),
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        // Dropped without wait(): kill and reap the child; the drain exits on EOF.
        if self.drain.take().is_some() {
            if matches!(self.child.try_wait(), Ok(None)) {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

fn drain_into(mut reader: io::PipeReader, sink: &Mutex<Vec<u8>>) -> io::Result<u64> {
    let mut chunk = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk[..n]);
        total += n as u64;
    }
}

/// Wait for `child`, killing it if `timeout` elapses first.
fn wait_child(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, HarnessError> {
    let Some(limit) = timeout else {
        return child.wait().map_err(|e| HarnessError::io("wait for child", e));
    };
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!(pid = child.id(), ?limit, "Child timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(HarnessError::Timeout(limit));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(HarnessError::io("wait for child", e)),
        }
    }
}

fn check_status(status: ExitStatus) -> Result<(), HarnessError> {
    if status.success() {
        Ok(())
    } else {
        Err(HarnessError::Exit { status })
    }
}

fn launch_error(inv: &Invocation, source: io::Error) -> HarnessError {
    HarnessError::Launch {
        program: inv.program.clone(),
        source,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn sh(script: &str) -> Invocation {
        Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
            child_args: Vec::new(),
            envs: Vec::new(),
            caller_config: false,
        }
    }

    #[test]
    fn merges_stdout_and_stderr_in_write_order() {
        let (out, res) = run_with_output(&sh("echo one; echo two 1>&2; echo three"), None);
        res.unwrap();
        assert_eq!(out, "one\ntwo\nthree\n");
    }

    #[test]
    fn exit_failure_keeps_output() {
        let (out, res) = run_with_output(&sh("echo broken 1>&2; exit 3"), None);
        assert_eq!(out, "broken\n");
        let err = res.unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.code(), "exit");
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let inv = Invocation {
            program: PathBuf::from("/definitely/not/here"),
            args: Vec::new(),
            child_args: Vec::new(),
            envs: Vec::new(),
            caller_config: false,
        };
        let err = run_status(&inv, None).unwrap_err();
        assert!(matches!(err, HarnessError::Launch { .. }), "got {err:?}");
        let (out, res) = run_with_output(&inv, None);
        assert!(out.is_empty());
        assert!(matches!(res, Err(HarnessError::Launch { .. })));
    }

    #[test]
    fn run_status_reports_only_outcome() {
        run_status(&sh("echo ignored"), None).unwrap();
        let err = run_status(&sh("exit 1"), None).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn env_is_passed_to_child() {
        let mut inv = sh("printf '%s' \"$CMD_HARNESS_PROBE\"");
        inv.envs.push(("CMD_HARNESS_PROBE".into(), "visible".into()));
        let (out, res) = run_with_output(&inv, None);
        res.unwrap();
        assert_eq!(out, "visible");
    }

    #[test]
    fn streaming_buffer_is_readable_while_running() {
        let mut stream = OutputStream::spawn(&sh("echo early; sleep 1; echo late"), None).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !stream.output().contains("early") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(stream.output().contains("early"));
        assert!(stream.is_running());
        let (out, res) = stream.wait();
        res.unwrap();
        assert_eq!(out, "early\nlate\n");
    }

    #[test]
    fn streaming_final_output_matches_blocking() {
        let script = "for i in 1 2 3; do echo out$i; echo err$i 1>&2; done";
        let (blocking, _) = run_with_output(&sh(script), None);
        let (streamed, res) = OutputStream::spawn(&sh(script), None).unwrap().wait();
        res.unwrap();
        assert_eq!(streamed, blocking);
    }

    #[test]
    fn timeout_kills_hung_child() {
        let started = Instant::now();
        let (_, res) = run_with_output(&sh("exec sleep 30"), Some(Duration::from_millis(200)));
        assert!(matches!(res, Err(HarnessError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
