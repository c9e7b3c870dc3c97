//! Child process execution with a timeout and bounded output capture.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

type Tee = Arc<Option<Mutex<BufWriter<File>>>>;

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is drained concurrently while the child runs. `output_limit_bytes` bounds what is
/// kept in memory per stream; bytes beyond it are discarded while the pipe keeps draining.
/// When `tee_path` is set, every stdout line is also appended to that file as it arrives.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, tee = tee_path.is_some()))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    tee_path: Option<&Path>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let tee: Tee = Arc::new(match tee_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create stream dir {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("create stream file {}", path.display()))?;
            Some(Mutex::new(BufWriter::new(file)))
        }
        None => None,
    });

    let mut child = spawn(&mut cmd)?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(anyhow!("child output was not piped"));
    };
    // Fed from its own thread so a child that writes before it finishes
    // reading cannot block on a full stdout pipe.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("child stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(&mut pipe, &input)))
        }
        None => None,
    };

    let stdout_handle =
        thread::spawn(move || read_lines_limited(stdout, output_limit_bytes, &tee));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Err(err)) => warn!(err = %format!("{err:#}"), "child stdin not fully written"),
            Ok(Ok(())) => {}
            Err(_) => warn!("stdin writer thread panicked"),
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    debug!(program = ?cmd.get_program(), "spawning child process");
    cmd.spawn()
        .inspect_err(|err| error!(err = %err, "spawn failed"))
        .with_context(|| format!("spawn {:?}", cmd.get_program()))
}

/// Write all of `input`; the pipe closes when the caller drops it, so the
/// child sees EOF. A child exiting early is not an error.
fn write_stdin(pipe: &mut ChildStdin, input: &[u8]) -> Result<()> {
    match pipe.write_all(input) {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other.context("write child stdin"),
    }
}

/// Wait up to `timeout`; past it the child is killed and reaped.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for child")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "child exceeded timeout, killing");
    child.kill().context("kill child")?;
    let status = child.wait().context("reap killed child")?;
    Ok((status, true))
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("pipe reader thread panicked")))
}

fn keep_within(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> usize {
    let remaining = limit.saturating_sub(buf.len());
    let keep = chunk.len().min(remaining);
    buf.extend_from_slice(&chunk[..keep]);
    chunk.len() - keep
}

/// Read line by line so each line can be mirrored to the tee file immediately.
fn read_lines_limited<R: Read>(reader: R, limit: usize, tee: &Tee) -> Result<(Vec<u8>, usize)> {
    let mut reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).context("read line")?;
        if n == 0 {
            break;
        }
        if let Some(mutex) = tee.as_ref()
            && let Ok(mut writer) = mutex.lock()
        {
            if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to write stream file");
            }
        }
        truncated += keep_within(&mut collected, &line, limit);
    }

    Ok((collected, truncated))
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        truncated += keep_within(&mut buf, &chunk[..n], limit);
    }

    Ok((buf, truncated))
}
