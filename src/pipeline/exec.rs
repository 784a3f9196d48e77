//! Spawns validated stages as a connected process chain and collects output.
//!
//! Stage `i`'s stdin is wired directly to stage `i-1`'s stdout pipe, so the
//! stages run concurrently and back-pressure flows through the OS pipe.  Each
//! captured stream (every stage's stderr, the final stage's stdout) is drained
//! on its own reader thread while the stages run; draining after completion
//! would deadlock once a stage writes more than one pipe buffer of errors.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use wait_timeout::ChildExt;

use crate::pipeline::error::PipelineError;
use crate::pipeline::policy::Policy;
use crate::pipeline::split::Stage;

/// Per-stream capture cap.  Output beyond this is discarded and the
/// truncation is marked in the aggregated text.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

const TRUNCATION_MARK: &str = "[output truncated]";

/// The outcome of one successful pipeline run.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    /// Final-stage stdout followed by each stage's stderr, stderr lines
    /// prefixed with `Error:`, stages in pipeline order.
    pub output: String,
    /// `true` when every stage exited with status zero.
    pub success: bool,
    /// Per-stage exit statuses, in pipeline order.
    pub statuses: Vec<i32>,
}

struct Captured {
    text: String,
    truncated: bool,
}

/// Drain a stream on its own thread, keeping at most `MAX_CAPTURE_BYTES`.
/// The stream is always read to EOF so the writing process never blocks.
fn spawn_capture<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<Captured> {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        let mut data = Vec::new();
        let mut truncated = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let room = MAX_CAPTURE_BYTES.saturating_sub(data.len());
                    let take = n.min(room);
                    data.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                }
                Err(_) => break,
            }
        }
        Captured {
            text: String::from_utf8_lossy(&data).into_owned(),
            truncated,
        }
    })
}

/// Terminate and reap every child, ignoring already-exited ones.
fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.kill();
    }
    for child in children.iter_mut() {
        let _ = child.wait();
    }
}

/// Map an exit status to a code, translating signal deaths to 128+N on Unix.
fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(1, |s| 128 + s))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

fn spawn_error(stage: &Stage, source: std::io::Error) -> PipelineError {
    PipelineError::Spawn {
        index: stage.index,
        program: stage.program().to_string(),
        source,
    }
}

/// Spawn the stages as a connected chain.
///
/// Returns the children plus the final stage's stdout pipe.  If any spawn
/// fails, every already-spawned stage is terminated and reaped first.
fn spawn_chain(stages: &[Stage]) -> Result<(Vec<Child>, Option<ChildStdout>), PipelineError> {
    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    let mut prev_stdout: Option<ChildStdout> = None;

    for stage in stages {
        let mut cmd = Command::new(stage.program());
        cmd.args(&stage.argv[1..]);
        match prev_stdout.take() {
            Some(upstream) => cmd.stdin(Stdio::from(upstream)),
            // Stage 0 serves a non-interactive caller: never wait on a TTY.
            None => cmd.stdin(Stdio::null()),
        };
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                kill_all(&mut children);
                return Err(spawn_error(stage, e));
            }
        };
        prev_stdout = child.stdout.take();
        children.push(child);
    }

    Ok((children, prev_stdout))
}

/// Validate every stage against `policy`, then run the pipeline with a
/// wall-clock budget of `timeout`.
///
/// # Errors
///
/// - [`PipelineError::PolicyViolation`] before anything is spawned, if any
///   stage's text fails the prefix check.
/// - [`PipelineError::Timeout`] when the pipeline outlives its budget; every
///   still-running stage has been terminated and reaped.
/// - [`PipelineError::Spawn`] when a stage's program cannot be started or
///   awaited.
/// - [`PipelineError::StageFailed`] when any stage exits non-zero, carrying
///   the first failing stage's position, program, code, and captured stderr.
pub fn execute(
    stages: &[Stage],
    policy: &Policy,
    timeout: Duration,
) -> Result<ExecutionResult, PipelineError> {
    if stages.is_empty() {
        return Err(PipelineError::Malformed("empty pipeline".to_string()));
    }
    policy.validate(stages)?;

    let (mut children, last_stdout) = spawn_chain(stages)?;

    // Start draining before waiting: a stage that fills a pipe buffer with
    // stderr would otherwise never exit.
    let mut stderr_readers = Vec::with_capacity(children.len());
    for i in 0..children.len() {
        match children[i].stderr.take() {
            Some(pipe) => stderr_readers.push(spawn_capture(pipe)),
            None => {
                kill_all(&mut children);
                return Err(spawn_error(
                    &stages[i],
                    std::io::Error::other("stderr not captured"),
                ));
            }
        }
    }
    let stdout_reader = match last_stdout {
        Some(pipe) => spawn_capture(pipe),
        None => {
            kill_all(&mut children);
            let last = stages.len() - 1;
            return Err(spawn_error(
                &stages[last],
                std::io::Error::other("stdout not captured"),
            ));
        }
    };

    // Wait for the whole chain against one shared deadline.
    let started = Instant::now();
    let mut statuses = Vec::with_capacity(children.len());
    let mut timed_out = false;
    for i in 0..children.len() {
        let remaining = timeout.saturating_sub(started.elapsed());
        match children[i].wait_timeout(remaining) {
            Ok(Some(status)) => statuses.push(exit_code_from_status(status)),
            Ok(None) => {
                timed_out = true;
                break;
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(spawn_error(&stages[i], e));
            }
        }
    }
    if timed_out {
        kill_all(&mut children);
        // Reader threads see EOF once the children are reaped.
        for reader in stderr_readers {
            let _ = reader.join();
        }
        let _ = stdout_reader.join();
        return Err(PipelineError::Timeout { timeout });
    }

    let join_err = |stage: &Stage| {
        spawn_error(stage, std::io::Error::other("output reader thread panicked"))
    };
    let mut stage_errors = Vec::with_capacity(stderr_readers.len());
    for (reader, stage) in stderr_readers.into_iter().zip(stages) {
        stage_errors.push(reader.join().map_err(|_| join_err(stage))?);
    }
    let final_stdout = stdout_reader
        .join()
        .map_err(|_| join_err(&stages[stages.len() - 1]))?;

    // Failure carries the first non-zero stage in pipeline order; later
    // stages may still have run to completion since the chain is
    // pipe-connected, not sequentially gated.
    if let Some((index, &code)) = statuses.iter().enumerate().find(|&(_, &c)| c != 0) {
        return Err(PipelineError::StageFailed {
            index,
            program: stages[index].program().to_string(),
            code,
            stderr: stage_errors[index].text.clone(),
        });
    }

    Ok(build_result(&final_stdout, &stage_errors, &statuses))
}

/// Aggregate captured streams: final-stage stdout first, then each stage's
/// stderr with every line prefixed `Error:`, stages in pipeline order.
fn build_result(final_stdout: &Captured, stage_errors: &[Captured], statuses: &[i32]) -> ExecutionResult {
    let mut output = String::new();
    output.push_str(&final_stdout.text);
    if final_stdout.truncated {
        output.push_str(TRUNCATION_MARK);
        output.push('\n');
    }
    for captured in stage_errors {
        for line in captured.text.lines() {
            output.push_str("Error: ");
            output.push_str(line);
            output.push('\n');
        }
        if captured.truncated {
            output.push_str("Error: ");
            output.push_str(TRUNCATION_MARK);
            output.push('\n');
        }
    }

    ExecutionResult {
        output,
        success: statuses.iter().all(|&c| c == 0),
        statuses: statuses.to_vec(),
    }
}
