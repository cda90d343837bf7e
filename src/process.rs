use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::error::{Error, Result};

/// A fully constructed external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the child inside `dir`. Only the child is affected; our own
    /// working directory never changes.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Parses a whitespace separated line such as `cmake ..`.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).args(words))
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Output of a child whose streams were captured rather than inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Spawns external programs and blocks until they finish.
pub trait Runner {
    /// Runs with inherited stdio and returns the exit code.
    fn status(&self, cmd: &CommandLine) -> Result<i32>;

    /// Runs with stdout and stderr captured.
    fn capture(&self, cmd: &CommandLine) -> Result<Captured>;

    fn run(&self, cmd: &CommandLine) -> Result<()> {
        let code = self.status(cmd)?;
        check(cmd, code)
    }

    /// Captures stdout and returns it. Stderr is passed through; on failure
    /// whatever was written to stdout is shown before bailing out.
    fn run_output(&self, cmd: &CommandLine) -> Result<String> {
        let captured = self.capture(cmd)?;
        eprint!("{}", captured.stderr);
        if !captured.success() {
            println!("{}", captured.stdout);
        }
        check(cmd, captured.code)?;
        Ok(captured.stdout)
    }

    /// Like `run`, but every occurrence of `secret` in the child's output is
    /// masked before it is printed.
    fn run_filtered(&self, cmd: &CommandLine, secret: &str) -> Result<()> {
        let captured = self.capture(cmd)?;
        let mut combined = captured.stdout.clone();
        combined.push_str(&captured.stderr);
        println!("{}", mask(&combined, secret));
        check(cmd, captured.code)
    }
}

fn check(cmd: &CommandLine, code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::ToolFailed {
            program: cmd.program.clone(),
            code,
        })
    }
}

pub fn mask(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, &"X".repeat(secret.len()))
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn status(&self, cmd: &CommandLine) -> Result<i32> {
        debug!(command = %cmd, cwd = ?cmd.cwd, "spawning");
        let status = cmd.to_command().status().map_err(|source| Error::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        Ok(exit_code(status))
    }

    fn capture(&self, cmd: &CommandLine) -> Result<Captured> {
        debug!(command = %cmd, cwd = ?cmd.cwd, "spawning (captured)");
        let output = cmd.to_command().output().map_err(|source| Error::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        Ok(Captured {
            code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// Records every invocation and replays queued results in order.
    /// Once the queue is empty every command succeeds with no output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        calls: RefCell<Vec<CommandLine>>,
        replies: RefCell<VecDeque<Captured>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, code: i32, stdout: &str) -> Self {
            self.replies.borrow_mut().push_back(Captured {
                code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            });
            self
        }

        pub fn reply_err(self, code: i32, stderr: &str) -> Self {
            self.replies.borrow_mut().push_back(Captured {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            });
            self
        }

        pub fn calls(&self) -> Vec<CommandLine> {
            self.calls.borrow().clone()
        }

        pub fn rendered(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }

        fn next(&self, cmd: &CommandLine) -> Captured {
            self.calls.borrow_mut().push(cmd.clone());
            self.replies.borrow_mut().pop_front().unwrap_or_default()
        }
    }

    impl Runner for ScriptedRunner {
        fn status(&self, cmd: &CommandLine) -> Result<i32> {
            Ok(self.next(cmd).code)
        }

        fn capture(&self, cmd: &CommandLine) -> Result<Captured> {
            Ok(self.next(cmd))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_command_line_display() {
        let cmd = CommandLine::new("cargo").arg("test").args(["--features", "unstable"]);
        assert_eq!(cmd.to_string(), "cargo test --features unstable");
        assert_eq!(cmd.cwd, None);
    }

    #[test]
    fn test_from_line() {
        let cmd = CommandLine::from_line("  cmake .. ").unwrap();
        assert_eq!(cmd.program, "cmake");
        assert_eq!(cmd.args, vec![".."]);
        assert!(CommandLine::from_line("   ").is_none());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask("push https://abc@github.com", "abc"), "push https://XXX@github.com");
        assert_eq!(mask("nothing here", ""), "nothing here");
    }

    #[test]
    fn test_run_propagates_exit_code() {
        let runner = ScriptedRunner::new().reply(3, "");
        let err = runner.run(&CommandLine::new("false")).unwrap_err();
        assert!(matches!(err, Error::ToolFailed { code: 3, .. }));
    }

    #[test]
    fn test_run_output_returns_stdout() {
        let runner = ScriptedRunner::new().reply(0, "rustc 1.80.0\n");
        let out = runner.run_output(&CommandLine::new("rustc").arg("-V")).unwrap();
        assert_eq!(out, "rustc 1.80.0\n");
        assert_eq!(runner.rendered(), vec!["rustc -V"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_child_status() {
        let runner = SystemRunner;
        assert_eq!(runner.status(&CommandLine::new("true")).unwrap(), 0);
        assert_ne!(runner.status(&CommandLine::new("false")).unwrap(), 0);

        let captured = runner
            .capture(&CommandLine::new("echo").arg("hello"))
            .unwrap();
        assert!(captured.success());
        assert!(captured.stdout.contains("hello"));
    }

    #[test]
    fn test_spawn_failure() {
        let err = SystemRunner
            .status(&CommandLine::new("definitely-not-a-real-program-xyz"))
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
