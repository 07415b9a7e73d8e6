use crate::process::{self, Invocation, MergedOutput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Asking a [`Runner`] for its exit code before it has run.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("runner has never run")]
pub struct NeverRan;

/// A streamed run that ended with a non-zero exit code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command `{}` exited with code {code}", .argv.join(" "))]
pub struct ExecutionFailure {
    pub code: i32,
    pub argv: Vec<String>,
}

/// One item of a verbose run. The stream ends with exactly one of
/// `Finished` or `Failed` unless it is dropped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Line(String),
    Finished,
    Failed(ExecutionFailure),
}

/// Executes one [`Invocation`] and remembers its exit code.
#[derive(Debug)]
pub struct Runner {
    invocation: Invocation,
    exit_code: Option<i32>,
}

impl Runner {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            exit_code: None,
        }
    }

    /// Blocks until exit with output discarded. A non-zero code is returned,
    /// not raised.
    pub fn run_silent(&mut self) -> Result<i32, RunError> {
        let code =
            process::run_discarding(&self.invocation).map_err(|source| RunError::Spawn {
                program: self.invocation.program_name(),
                source,
            })?;
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Starts the child and streams its combined output line by line.
    pub fn run_verbose(&mut self) -> Result<OutputLines<'_>, RunError> {
        let output = MergedOutput::spawn(&self.invocation).map_err(|source| RunError::Spawn {
            program: self.invocation.program_name(),
            source,
        })?;
        self.exit_code = None;
        Ok(OutputLines {
            runner: self,
            output,
            done: false,
        })
    }

    pub fn exit_code(&self) -> Result<i32, NeverRan> {
        self.exit_code.ok_or(NeverRan)
    }
}

/// Lazy, single-pass line stream of a verbose run.
#[derive(Debug)]
pub struct OutputLines<'a> {
    runner: &'a mut Runner,
    output: MergedOutput,
    done: bool,
}

impl Iterator for OutputLines<'_> {
    type Item = Result<StreamEvent, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(line) = self.output.next() {
            return Some(Ok(StreamEvent::Line(line)));
        }

        self.done = true;
        let code = match self.output.wait() {
            Ok(code) => code,
            Err(source) => {
                return Some(Err(RunError::Wait {
                    program: self.runner.invocation.program_name(),
                    source,
                }));
            }
        };
        self.runner.exit_code = Some(code);
        if code == 0 {
            Some(Ok(StreamEvent::Finished))
        } else {
            Some(Ok(StreamEvent::Failed(ExecutionFailure {
                code,
                argv: self.runner.invocation.argv(),
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(body: &str) -> Runner {
        Runner::new(Invocation::new("sh").args(["-c", body]))
    }

    #[test]
    fn test_exit_code_before_run_is_never_ran() {
        let runner = script("exit 0");
        assert_eq!(runner.exit_code(), Err(NeverRan));
    }

    #[test]
    fn test_spawn_failure_is_an_error() {
        let mut runner = Runner::new(Invocation::new("/nonexistent/sound_adder-tool"));
        assert!(matches!(runner.run_silent(), Err(RunError::Spawn { .. })));
        assert_eq!(runner.exit_code(), Err(NeverRan));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_silent_reports_nonzero_as_value() {
        let mut runner = script("echo ignored; exit 2");
        assert_eq!(runner.run_silent().unwrap(), 2);
        assert_eq!(runner.exit_code(), Ok(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_verbose_clean_exit() {
        let mut runner = script("echo first; echo second");
        let events: Vec<StreamEvent> = runner
            .run_verbose()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Line("first".into()),
                StreamEvent::Line("second".into()),
                StreamEvent::Finished,
            ]
        );
        assert_eq!(runner.exit_code(), Ok(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_verbose_failure_at_end_of_stream() {
        let mut runner = script("echo working 1>&2; exit 5");
        let events: Vec<StreamEvent> = runner
            .run_verbose()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Line("working".into()));
        match &events[1] {
            StreamEvent::Failed(failure) => {
                assert_eq!(failure.code, 5);
                assert_eq!(failure.argv, vec!["sh", "-c", "echo working 1>&2; exit 5"]);
                assert_eq!(
                    failure.to_string(),
                    "command `sh -c echo working 1>&2; exit 5` exited with code 5"
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(runner.exit_code(), Ok(5));
    }
}
