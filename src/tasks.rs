use crate::error::CommandError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Status a POSIX shell reports for a pipeline writer killed by SIGPIPE.
pub const BROKEN_PIPE_STATUS: i32 = 141;

const AFFIRMATIVE: &[u8] = b"y\n";

/// Exit statuses that count as success for a given command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPolicy {
    benign: Vec<i32>,
}

impl ExitPolicy {
    pub fn new(benign: impl IntoIterator<Item = i32>) -> Self {
        Self {
            benign: benign.into_iter().collect(),
        }
    }

    /// Only 0 succeeds.
    pub fn strict() -> Self {
        Self::new([0])
    }

    /// 0, plus the broken-pipe status left behind when the command stops
    /// reading its input before the feeder stops writing.
    pub fn tolerate_broken_pipe() -> Self {
        Self::new([0, BROKEN_PIPE_STATUS])
    }

    pub fn is_benign(&self, code: i32) -> bool {
        self.benign.contains(&code)
    }

    pub fn benign_codes(&self) -> &[i32] {
        &self.benign
    }
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Out,
    Err,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            Stream::Out => write!(f, "[OUT] {}", self.text),
            Stream::Err => write!(f, "[ERR] {}", self.text),
        }
    }
}

/// A shell command plus how to judge its exit.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub cmd: String,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
    pub policy: ExitPolicy,
    /// Print output lines as they arrive.
    pub echo: bool,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.into(),
            envs: Vec::new(),
            policy: ExitPolicy::default(),
            echo: false,
        }
    }

    pub fn policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub code: i32,
    pub output: Vec<OutputLine>,
}

#[cfg(unix)]
fn spawn_shell(cmd: &str, cwd: &Path, envs: &[(String, String)]) -> std::io::Result<Child> {
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(cwd)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

#[cfg(not(unix))]
fn spawn_shell(cmd: &str, cwd: &Path, envs: &[(String, String)]) -> std::io::Result<Child> {
    Command::new("cmd")
        .arg("/C")
        .arg(cmd)
        .current_dir(cwd)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Exit code as a shell would report it: `128 + n` for death by signal `n`.
#[cfg(unix)]
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        return code;
    }
    match status.signal() {
        Some(sig) => {
            if let Ok(signal) = nix::sys::signal::Signal::try_from(sig) {
                tracing::debug!("child terminated by {}", signal.as_str());
            }
            128 + sig
        }
        None => 1,
    }
}

#[cfg(not(unix))]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(if status.success() { 0 } else { 1 })
}

/// Spawn a command and return (child, receiver of output lines).
/// Blank lines are dropped.
fn spawn_task(
    cmd: &str,
    cwd: &Path,
    envs: &[(String, String)],
) -> std::io::Result<(Child, mpsc::UnboundedReceiver<OutputLine>)> {
    let mut child = spawn_shell(cmd, cwd, envs)?;

    let (tx, rx) = mpsc::unbounded_channel::<OutputLine>();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = r.next_line().await {
                let text = line.trim_end().to_string();
                if !text.is_empty() {
                    let _ = tx.send(OutputLine {
                        stream: Stream::Out,
                        text,
                    });
                }
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = r.next_line().await {
                let text = line.trim_end().to_string();
                if !text.is_empty() {
                    let _ = tx.send(OutputLine {
                        stream: Stream::Err,
                        text,
                    });
                }
            }
        });
    }

    Ok((child, rx))
}

/// Run `command` with stdin fed an endless stream of `y` lines, so
/// confirmation prompts are answered. The exit status is judged by the
/// command's [`ExitPolicy`].
pub async fn run_with_affirmative_input(
    command: &ShellCommand,
) -> Result<CommandOutcome, CommandError> {
    tracing::debug!(cmd = %command.cmd, cwd = %command.cwd.display(), "spawning");

    let (mut child, mut rx) =
        spawn_task(&command.cmd, &command.cwd, &command.envs).map_err(|source| {
            CommandError::Spawn {
                cmd: command.cmd.clone(),
                source,
            }
        })?;

    let feeder = child.stdin.take().map(|mut stdin| {
        let chunk = AFFIRMATIVE.repeat(512);
        tokio::spawn(async move {
            // ends once the reader side closes (EPIPE)
            while stdin.write_all(&chunk).await.is_ok() {}
        })
    });

    let mut output = Vec::new();
    while let Some(line) = rx.recv().await {
        if command.echo {
            match line.stream {
                Stream::Out => println!("{}", line.text),
                Stream::Err => eprintln!("{}", line.text),
            }
        }
        output.push(line);
    }

    let status = child.wait().await.map_err(|source| CommandError::Spawn {
        cmd: command.cmd.clone(),
        source,
    })?;
    if let Some(feeder) = feeder {
        feeder.abort();
    }

    let code = exit_code(status);
    if command.policy.is_benign(code) {
        if code != 0 {
            tracing::debug!(code, "exit status accepted as success");
        }
        Ok(CommandOutcome { code, output })
    } else {
        Err(CommandError::Failed {
            cmd: command.cmd.clone(),
            code,
            output: output.iter().map(ToString::to_string).collect(),
        })
    }
}

/// Lines to print on stderr for a failed run. Captured output is repeated
/// unless it was already echoed live.
pub fn failure_report(err: &CommandError, echoed: bool) -> Vec<String> {
    let mut lines = vec![format!("❌ Schema push failed: {err}")];
    if !echoed {
        lines.extend(err.output().iter().map(|l| format!("   {l}")));
    }
    lines
}

/// Process exit code for a finished run: 0 on success, 1 otherwise.
pub fn process_exit_code<T>(result: &Result<T, CommandError>) -> i32 {
    if result.is_ok() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_policy() {
        let policy = ExitPolicy::tolerate_broken_pipe();
        assert!(policy.is_benign(0));
        assert!(policy.is_benign(141));
        assert!(!policy.is_benign(1));
        assert!(!policy.is_benign(2));
    }

    #[test]
    fn strict_policy_is_default() {
        assert_eq!(ExitPolicy::default().benign_codes(), &[0]);
        assert!(!ExitPolicy::default().is_benign(141));
    }

    #[test]
    fn output_lines_are_tagged() {
        let line = OutputLine {
            stream: Stream::Err,
            text: "boom".into(),
        };
        assert_eq!(line.to_string(), "[ERR] boom");
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_maps_to_shell_status() {
        use std::os::unix::process::ExitStatusExt;

        // raw wait status: terminated by SIGPIPE (13)
        assert_eq!(exit_code(ExitStatus::from_raw(13)), 141);
        // raw wait status: exited with code 2
        assert_eq!(exit_code(ExitStatus::from_raw(2 << 8)), 2);
    }
}
