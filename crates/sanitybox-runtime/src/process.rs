//! Child processes whose output is consumed while they run.
//!
//! [`StreamingChild`] gives the child a single pipe for both stdout and
//! stderr, so lines keep the order the child wrote them in. One reader
//! thread drains the pipe into a channel and the child never stalls on a
//! full buffer. Lines are handed out through [`OutputLines`], a lazy,
//! non-restartable iterator. Once it is exhausted, [`StreamingChild::wait`]
//! collects the exit status.
//!
//! A deadline and a [`CancelToken`] can end the run early, whether the child
//! is still writing or has closed its output and keeps running. In both
//! cases the child is killed and [`ChildExit::end`] records why.

use std::io::{BufRead, BufReader, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sanitybox_common::constants::CANCEL_POLL_INTERVAL_MS;

/// How often a child that closed its output is checked for exit.
const REAP_POLL: Duration = Duration::from_millis(10);

/// Shared flag that asks running children to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the output stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The child closed its output and exited on its own.
    Exhausted,
    /// The deadline passed and the child was killed.
    TimedOut,
    /// The cancel token fired and the child was killed.
    Cancelled,
}

/// Final state of a streamed child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildExit {
    /// Exit code, or `128 + signal` when the child was killed by a signal.
    pub code: i32,
    /// Why the output stream ended.
    pub end: StreamEnd,
    /// Lines that were produced but never pulled from the iterator.
    pub unread: Vec<String>,
}

/// A running child whose combined output is read incrementally.
pub struct StreamingChild {
    child: Child,
    command: String,
    rx: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
    end: Option<StreamEnd>,
    reaped: bool,
}

impl StreamingChild {
    /// Spawns `command` with stdin closed and stdout and stderr sharing one
    /// pipe.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from creating the pipe or spawning the process.
    pub fn spawn(
        mut command: Command,
        timeout: Option<Duration>,
        cancel: Option<CancelToken>,
    ) -> std::io::Result<Self> {
        let line = command_line(&command);
        let (pipe, writer) = std::io::pipe()?;
        let _ = command
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        let child = command.spawn();
        // The command owns the parent's write ends; the reader only sees
        // end of file once they are closed.
        drop(command);
        let child = child?;
        tracing::debug!(command = %line, pid = child.id(), "spawned child");

        let (tx, rx) = mpsc::channel();
        let reader = spawn_reader(pipe, tx);

        Ok(Self {
            child,
            command: line,
            rx,
            reader: Some(reader),
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
            end: None,
            reaped: false,
        })
    }

    /// Printable command line of the child.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Iterator over output lines in arrival order.
    pub fn lines(&mut self) -> OutputLines<'_> {
        OutputLines { child: self }
    }

    /// Drains what is left of the output and waits for the exit status.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from waiting on the process.
    pub fn wait(mut self) -> std::io::Result<ChildExit> {
        let mut unread: Vec<String> = Vec::new();
        if self.end.is_none() {
            unread.extend(self.lines());
        }
        let exhausted = self.end == Some(StreamEnd::Exhausted);

        let status = self.reap()?;
        self.reaped = true;
        let end = self.end.unwrap_or(StreamEnd::Exhausted);

        if exhausted {
            if let Some(reader) = self.reader.take() {
                let _ = reader.join();
            }
        } else {
            // Grandchildren may still hold the pipe open; the reader is left
            // to finish on its own.
            unread.extend(self.rx.try_iter());
        }

        Ok(ChildExit {
            code: exit_code(status),
            end,
            unread,
        })
    }

    /// Waits for the exit status. A child that closed its output but keeps
    /// running is still held to the deadline and the cancel token.
    fn reap(&mut self) -> std::io::Result<ExitStatus> {
        if self.end == Some(StreamEnd::Exhausted) {
            loop {
                if let Some(status) = self.child.try_wait()? {
                    return Ok(status);
                }
                if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                    self.stop(StreamEnd::Cancelled);
                    break;
                }
                if self.deadline.is_some_and(|d| Instant::now() >= d) {
                    self.stop(StreamEnd::TimedOut);
                    break;
                }
                match self.poll_interval() {
                    Some(wait) => std::thread::sleep(wait.min(REAP_POLL)),
                    None => break,
                }
            }
        }
        self.child.wait()
    }

    fn next_line(&mut self) -> Option<String> {
        if self.end.is_some() {
            return None;
        }
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                self.stop(StreamEnd::Cancelled);
                return None;
            }

            let received = match self.poll_interval() {
                Some(wait) => self.rx.recv_timeout(wait),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(line) => return Some(line),
                Err(RecvTimeoutError::Disconnected) => {
                    self.end = Some(StreamEnd::Exhausted);
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.deadline.is_some_and(|d| Instant::now() >= d) {
                        self.stop(StreamEnd::TimedOut);
                        return None;
                    }
                }
            }
        }
    }

    fn poll_interval(&self) -> Option<Duration> {
        let remaining = self
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()));
        let poll = self
            .cancel
            .as_ref()
            .map(|_| Duration::from_millis(CANCEL_POLL_INTERVAL_MS));
        match (remaining, poll) {
            (Some(r), Some(p)) => Some(r.min(p)),
            (r, p) => r.or(p),
        }
    }

    fn stop(&mut self, end: StreamEnd) {
        tracing::warn!(command = %self.command, reason = ?end, "killing child process");
        if let Err(e) = self.child.kill() {
            tracing::debug!(command = %self.command, error = %e, "kill failed");
        }
        self.end = Some(end);
    }
}

impl Drop for StreamingChild {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Lazy iterator over a [`StreamingChild`]'s output.
///
/// Yields lines without their `\n` or `\r\n` terminator; other whitespace
/// is kept. Ends when the child closes its output, the deadline passes or
/// cancellation fires.
pub struct OutputLines<'a> {
    child: &'a mut StreamingChild,
}

impl Iterator for OutputLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.next_line()
    }
}

fn spawn_reader(pipe: PipeReader, tx: Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for chunk in BufReader::new(pipe).split(b'\n') {
            let Ok(bytes) = chunk else { break };
            let bytes = bytes.strip_suffix(b"\r").unwrap_or(&bytes);
            let line = String::from_utf8_lossy(bytes).into_owned();
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

/// Renders a command as a single shell-like line for logs and errors.
#[must_use]
pub fn command_line(cmd: &Command) -> String {
    let mut s = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        s.push(' ');
        let arg = arg.to_string_lossy();
        if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains(['"', '\'']) {
            s.push('\'');
            s.push_str(&arg.replace('\'', "'\\''"));
            s.push('\'');
        } else {
            s.push_str(&arg);
        }
    }
    s
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn lines_arrive_in_emission_order() {
        let mut child = StreamingChild::spawn(
            sh("echo 'test 1 ran'; echo 'test2 ran'; echo third"),
            None,
            None,
        )
        .expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let exit = child.wait().expect("wait");

        assert_eq!(lines, ["test 1 ran", "test2 ran", "third"]);
        assert_eq!(exit.code, 0);
        assert_eq!(exit.end, StreamEnd::Exhausted);
        assert!(exit.unread.is_empty());
    }

    #[test]
    fn stderr_is_merged_into_the_stream() {
        let mut child =
            StreamingChild::spawn(sh("echo out; echo err >&2"), None, None).expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let _ = child.wait().expect("wait");
        assert_eq!(lines, ["out", "err"]);
    }

    #[test]
    fn interleaved_stdout_and_stderr_keep_their_order() {
        let script = "i=1; while [ $i -le 10 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done";
        let expected: Vec<String> = (1..=10)
            .flat_map(|i| [format!("out{i}"), format!("err{i}")])
            .collect();

        for _ in 0..25 {
            let mut child = StreamingChild::spawn(sh(script), None, None).expect("spawn");
            let lines: Vec<String> = child.lines().collect();
            assert_eq!(child.wait().expect("wait").code, 0);
            assert_eq!(lines, expected);
        }
    }

    #[test]
    fn only_line_terminators_are_stripped() {
        let mut child = StreamingChild::spawn(sh(r"printf 'a  \n\tb\r\n\nlast '"), None, None)
            .expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let _ = child.wait().expect("wait");
        assert_eq!(lines, ["a  ", "\tb", "", "last "]);
    }

    #[test]
    fn no_output_is_not_an_error() {
        let mut child = StreamingChild::spawn(sh("exit 0"), None, None).expect("spawn");
        assert_eq!(child.lines().count(), 0);
        assert_eq!(child.wait().expect("wait").code, 0);
    }

    #[test]
    fn non_zero_exit_code_is_reported() {
        let mut child =
            StreamingChild::spawn(sh("echo test1 ran; echo test2 ran; exit 3"), None, None)
                .expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let exit = child.wait().expect("wait");
        assert_eq!(lines, ["test1 ran", "test2 ran"]);
        assert_eq!(exit.code, 3);
    }

    #[test]
    fn wait_collects_unread_lines() {
        let child = StreamingChild::spawn(sh("echo a; echo b"), None, None).expect("spawn");
        let exit = child.wait().expect("wait");
        assert_eq!(exit.unread, ["a", "b"]);
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let mut child =
            StreamingChild::spawn(sh("i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done"), None, None)
                .expect("spawn");
        let count = child.lines().count();
        assert_eq!(child.wait().expect("wait").code, 0);
        assert_eq!(count, 20000);
    }

    #[test]
    fn deadline_kills_the_child() {
        let mut child = StreamingChild::spawn(
            sh("echo started; exec sleep 30"),
            Some(Duration::from_millis(500)),
            None,
        )
        .expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let exit = child.wait().expect("wait");

        assert_eq!(lines, ["started"]);
        assert_eq!(exit.end, StreamEnd::TimedOut);
        assert_ne!(exit.code, 0);
    }

    #[test]
    fn deadline_applies_after_output_is_closed() {
        let started = Instant::now();
        let mut child = StreamingChild::spawn(
            sh("echo started; exec >/dev/null 2>&1; exec sleep 30"),
            Some(Duration::from_millis(500)),
            None,
        )
        .expect("spawn");
        let lines: Vec<String> = child.lines().collect();
        let exit = child.wait().expect("wait");

        assert_eq!(lines, ["started"]);
        assert_eq!(exit.end, StreamEnd::TimedOut);
        assert_ne!(exit.code, 0);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancel_applies_after_output_is_closed() {
        let token = CancelToken::new();
        let child = StreamingChild::spawn(
            sh("exec >/dev/null 2>&1; exec sleep 30"),
            None,
            Some(token.clone()),
        )
        .expect("spawn");

        let started = Instant::now();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            token.cancel();
        });
        let exit = child.wait().expect("wait");
        canceller.join().expect("join");

        assert_eq!(exit.end, StreamEnd::Cancelled);
        assert!(exit.unread.is_empty());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn child_exiting_after_closing_output_is_not_killed() {
        let mut child = StreamingChild::spawn(
            sh("exec >/dev/null 2>&1; sleep 0.3; exit 4"),
            Some(Duration::from_secs(20)),
            None,
        )
        .expect("spawn");
        assert_eq!(child.lines().count(), 0);
        let exit = child.wait().expect("wait");
        assert_eq!(exit.end, StreamEnd::Exhausted);
        assert_eq!(exit.code, 4);
    }

    #[test]
    fn cancel_token_kills_the_child() {
        let token = CancelToken::new();
        let mut child =
            StreamingChild::spawn(sh("echo started; exec sleep 30"), None, Some(token.clone()))
                .expect("spawn");

        let first = child.lines().next();
        token.cancel();
        let rest: Vec<String> = child.lines().collect();
        let exit = child.wait().expect("wait");

        assert_eq!(first.as_deref(), Some("started"));
        assert!(rest.is_empty());
        assert_eq!(exit.end, StreamEnd::Cancelled);
    }

    #[test]
    fn command_line_quotes_awkward_arguments() {
        let mut cmd = Command::new("podman");
        let _ = cmd.args(["run", "--label", "a b", "it's", ""]);
        assert_eq!(command_line(&cmd), r"podman run --label 'a b' 'it'\''s' ''");
    }

    #[test]
    fn spawn_missing_binary_fails() {
        let cmd = Command::new("/nonexistent/engine");
        assert!(StreamingChild::spawn(cmd, None, None).is_err());
    }
}
