use std::io::{BufRead, BufReader, PipeReader};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use specflow_core::BackendError;
use tracing::{debug, info, warn};

/// A child process managed within its own process group.
/// Enables killing the entire process tree (including any orphaned children
/// that inherit pipe file descriptors).
///
/// Dropping an unreaped `ManagedChild` SIGKILLs the group and reaps the
/// leader, so no exit path leaves a zombie behind.
pub struct ManagedChild {
    child: Child,
    pgid: i32,
    reaped: bool,
}

impl ManagedChild {
    /// Spawn `cmd` in a new session with stdout and stderr sharing one pipe.
    /// Returns the managed child and the read end of that pipe.
    pub fn spawn(mut cmd: Command) -> Result<(Self, PipeReader), BackendError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        let (reader, writer) = std::io::pipe()?;
        let writer_err = writer.try_clone()?;

        cmd.stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);

        // Create new process group via setsid so we can kill the whole tree
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|source| BackendError::Spawn { program, source })?;
        // The Command still owns our copies of the write end; the reader
        // only sees EOF once they are closed.
        drop(cmd);

        let pgid = child.id() as i32;
        Ok((
            ManagedChild {
                child,
                pgid,
                reaped: false,
            },
            reader,
        ))
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if !self.reaped {
            debug!("reaping process group {} on early exit", self.pgid);
            signal_group(self.pgid, Signal::SIGKILL);
            let _ = self.child.wait();
        }
    }
}

/// Send `signal` to a process group. Returns false once the group is gone.
fn signal_group(pgid: i32, signal: Signal) -> bool {
    // negative PID = process group
    match kill(Pid::from_raw(-pgid), signal) {
        Ok(()) => true,
        // ESRCH: the group already exited
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!("{signal} to process group {pgid} failed: {e}");
            false
        }
    }
}

/// Deadline enforcement for one subprocess.
///
/// Blocks on the stop channel for `deadline`. If the deadline passes first it
/// marks `timed_out`, sends SIGTERM, gives the group `grace` to exit, then
/// SIGKILLs it. Stop and timed-out are separate signals: stop only says the
/// reader is done, `timed_out` says the watcher had to intervene.
fn spawn_watcher(
    pgid: i32,
    deadline: Duration,
    grace: Duration,
    timed_out: Arc<AtomicBool>,
    stop: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("watchdog-{pgid}"))
        .spawn(move || {
            match stop.recv_timeout(deadline) {
                Err(RecvTimeoutError::Timeout) => {}
                // stopped, or the reader went away
                _ => return,
            }

            timed_out.store(true, Ordering::SeqCst);
            info!("process group {pgid} timed out after {deadline:?}, sending SIGTERM");
            if !signal_group(pgid, Signal::SIGTERM) {
                return;
            }

            if let Err(RecvTimeoutError::Timeout) = stop.recv_timeout(grace) {
                warn!("process group {pgid} ignored SIGTERM for {grace:?}, sending SIGKILL");
                signal_group(pgid, Signal::SIGKILL);
            }
        })
}

/// Run `cmd`, handing each output line (terminator stripped) to `on_line`
/// as it arrives.
///
/// With a non-zero `timeout`, a watcher thread kills the process group once
/// the deadline passes (SIGTERM, then SIGKILL after `kill_grace`) and the call
/// returns [`BackendError::Timeout`]. Otherwise returns the exit code and the
/// full output with line terminators intact.
pub fn run_streaming(
    cmd: Command,
    timeout: Option<Duration>,
    kill_grace: Duration,
    on_line: &mut dyn FnMut(&str),
) -> Result<(i32, String), BackendError> {
    let timeout = timeout.filter(|t| !t.is_zero());
    let (mut managed, reader) = ManagedChild::spawn(cmd)?;

    let timed_out = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let watcher = match timeout {
        Some(deadline) => Some(spawn_watcher(
            managed.pgid(),
            deadline,
            kill_grace,
            Arc::clone(&timed_out),
            stop_rx,
        )?),
        None => None,
    };

    let mut output = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(strip_terminator(&line));
        output.push_str(&line);
    }

    let status = managed.wait()?;
    let _ = stop_tx.send(());
    if let Some(watcher) = watcher {
        let _ = watcher.join();
    }

    if timed_out.load(Ordering::SeqCst) {
        return Err(BackendError::Timeout {
            after: timeout.unwrap_or_default(),
        });
    }

    Ok((status.code().unwrap_or(-1), output))
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn collect(
        script: &str,
        timeout: Option<Duration>,
    ) -> (Result<(i32, String), BackendError>, Vec<String>) {
        let mut lines = Vec::new();
        let result = run_streaming(
            sh(script),
            timeout,
            Duration::from_millis(200),
            &mut |l: &str| lines.push(l.to_string()),
        );
        (result, lines)
    }

    fn assert_gone(pid_file: &std::path::Path) {
        let pid: i32 = std::fs::read_to_string(pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
    }

    #[test]
    fn streams_lines_without_terminators() {
        let (result, lines) = collect("printf 'a\\nb\\r\\nc'", None);
        let (code, output) = result.unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(output, "a\nb\r\nc");
    }

    #[test]
    fn output_equals_delivered_lines() {
        let (result, lines) = collect("for i in 1 2 3 4 5; do echo line-$i; done", None);
        let (_, output) = result.unwrap();
        let rebuilt: String = lines.iter().map(|l| format!("{l}\n")).collect();
        assert_eq!(output, rebuilt);
    }

    #[test]
    fn stderr_is_combined() {
        let (result, lines) = collect("echo out; echo err >&2", None);
        result.unwrap();
        assert!(lines.contains(&"out".to_string()));
        assert!(lines.contains(&"err".to_string()));
    }

    #[test]
    fn reports_exit_code() {
        let (result, _) = collect("echo nope; exit 3", None);
        let (code, output) = result.unwrap();
        assert_eq!(code, 3);
        assert_eq!(output, "nope\n");
    }

    #[test]
    fn fast_command_under_deadline() {
        let (result, lines) = collect("echo quick", Some(Duration::from_secs(10)));
        let (code, _) = result.unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["quick"]);
    }

    #[test]
    fn zero_timeout_disables_watchdog() {
        let (result, _) = collect("sleep 0.3; echo done", Some(Duration::ZERO));
        assert_eq!(result.unwrap().1, "done\n");
    }

    #[test]
    fn timeout_kills_and_reaps() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; echo started; exec sleep 30", pid_file.display());

        let start = Instant::now();
        let (result, lines) = collect(&script, Some(Duration::from_millis(300)));
        assert!(matches!(result, Err(BackendError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(lines, vec!["started"]);
        assert_gone(&pid_file);
    }

    #[test]
    fn ignored_sigterm_escalates_to_sigkill() {
        let start = Instant::now();
        let (result, _) = collect("trap '' TERM; sleep 30", Some(Duration::from_millis(200)));
        assert!(matches!(result, Err(BackendError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn timeout_covers_silent_process() {
        // no output at all: the reader is blocked the whole time
        let (result, lines) = collect("sleep 30", Some(Duration::from_millis(200)));
        assert!(matches!(result, Err(BackendError::Timeout { .. })));
        assert!(lines.is_empty());
    }

    #[test]
    fn panicking_callback_still_reaps() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; echo boom; exec sleep 30", pid_file.display());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_streaming(
                sh(&script),
                Some(Duration::from_secs(30)),
                Duration::from_millis(200),
                &mut |_: &str| panic!("callback failed"),
            )
        }));
        assert!(outcome.is_err());
        assert_gone(&pid_file);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-binary-xyz");
        let err = run_streaming(cmd, None, Duration::from_millis(100), &mut |_: &str| {}).unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[test]
    fn strip_terminator_variants() {
        assert_eq!(strip_terminator("a\n"), "a");
        assert_eq!(strip_terminator("a\r\n"), "a");
        assert_eq!(strip_terminator("a"), "a");
    }
}
