use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with {status}{tail}", status = describe_exit(*code), tail = format_tail(stderr_tail))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },
    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' reported an error: {message}")]
    Reported { command: String, message: String },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn format_tail(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n  stderr:\n    {}", tail.join("\n    "))
    }
}

/// A fully specified external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Runs to completion, passing each stdout line to `on_line`.
    ///
    /// Stderr is drained on a helper thread so neither pipe can fill up; its last lines are
    /// attached to the error when the program exits unsuccessfully.
    pub fn run_streaming(&self, on_line: &mut dyn FnMut(&str)) -> Result<(), ProcessError> {
        let command = self.to_string();
        info!("Running {}", command);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail.into_iter().collect::<Vec<_>>()
        });

        let pumped = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout)
                .lines()
                .try_for_each(|line| line.map(|line| on_line(&line))),
            None => Ok(()),
        };
        if let Err(source) = pumped {
            warn!("Stopping {} after a stdout read error", command);
            child.kill().ok();
            child.wait().ok();
            stderr_reader.join().ok();
            return Err(ProcessError::Io { command, source });
        }

        let status = child.wait().map_err(|source| ProcessError::Io {
            command: command.clone(),
            source,
        })?;
        let stderr_tail = stderr_reader.join().unwrap_or_default();

        if status.success() {
            debug!("{} finished successfully", command);
            Ok(())
        } else {
            Err(ProcessError::Failed {
                command,
                code: status.code(),
                stderr_tail,
            })
        }
    }

    pub fn run(&self) -> Result<(), ProcessError> {
        self.run_streaming(&mut |line| debug!("{}", line))
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
