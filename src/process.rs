use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// A fully built external command: program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }

    /// Program followed by its arguments, lossily converted for display.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

/// Maps an exit status to an integer code. Signal deaths become `-signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}

/// Runs the invocation to completion with both output streams discarded.
pub fn run_discarding(invocation: &Invocation) -> io::Result<i32> {
    let status = invocation
        .command()
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(exit_code_of(status))
}

/// A running child whose stdout and stderr are merged into one line stream.
///
/// Lines arrive in the order the reader threads see them; relative order
/// between the two pipes is best effort. Dropping an unfinished stream kills
/// and reaps the child.
#[derive(Debug)]
pub struct MergedOutput {
    child: Child,
    lines: Receiver<String>,
    readers: Vec<thread::JoinHandle<()>>,
    reaped: bool,
}

impl MergedOutput {
    pub fn spawn(invocation: &Invocation) -> io::Result<Self> {
        let mut child = invocation
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pump_lines(stderr, tx));
        }

        Ok(Self {
            child,
            lines: rx,
            readers,
            reaped: false,
        })
    }

    /// Blocks until the output is exhausted and the child exits.
    pub fn wait(&mut self) -> io::Result<i32> {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(exit_code_of(status))
    }

    /// Stops the child early, e.g. once enough output has been seen.
    pub fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Iterator for MergedOutput {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.lines.recv().ok()
    }
}

impl Drop for MergedOutput {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn pump_lines<R: Read + Send + 'static>(reader: R, tx: Sender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _ = split_lines(reader, |line| tx.send(line).is_ok());
    })
}

/// Splits a byte stream on `\n` or `\r`, skipping empty fragments.
/// `emit` returning false stops reading.
pub fn split_lines<R: Read>(reader: R, mut emit: impl FnMut(String) -> bool) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let consumed = buf.len();
        for &byte in buf {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    let line = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    if !emit(line) {
                        return Ok(());
                    }
                }
            } else {
                pending.push(byte);
            }
        }
        reader.consume(consumed);
    }

    if !pending.is_empty() {
        emit(String::from_utf8_lossy(&pending).into_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        split_lines(input, |line| {
            out.push(line);
            true
        })
        .unwrap();
        out
    }

    #[test]
    fn test_split_lines_handles_carriage_returns() {
        let lines = collect(b"frame=1 time=00:00:01\rframe=2 time=00:00:02\r\nDone\n");
        assert_eq!(
            lines,
            vec!["frame=1 time=00:00:01", "frame=2 time=00:00:02", "Done"]
        );
    }

    #[test]
    fn test_split_lines_keeps_unterminated_tail() {
        assert_eq!(collect(b"a\n\n\nb"), vec!["a", "b"]);
        assert!(collect(b"").is_empty());
    }

    #[test]
    fn test_split_lines_stops_when_emit_declines() {
        let mut seen = Vec::new();
        split_lines(&b"one\ntwo\nthree\n"[..], |line| {
            seen.push(line);
            seen.len() < 2
        })
        .unwrap();
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[test]
    fn test_argv_includes_program() {
        let inv = Invocation::new("/usr/bin/ffmpeg").args(["-i", "a.mkv"]);
        assert_eq!(inv.argv(), vec!["/usr/bin/ffmpeg", "-i", "a.mkv"]);
        assert_eq!(inv.program_name(), "ffmpeg");
    }

    #[cfg(unix)]
    #[test]
    fn test_merged_output_reads_both_pipes() {
        let inv = Invocation::new("sh").args(["-c", "echo out; echo err 1>&2; exit 4"]);
        let mut merged = MergedOutput::spawn(&inv).unwrap();
        let mut lines: Vec<String> = merged.by_ref().collect();
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
        assert_eq!(merged.wait().unwrap(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_discarding_returns_exit_code() {
        let inv = Invocation::new("sh").args(["-c", "echo noisy; exit 3"]);
        assert_eq!(run_discarding(&inv).unwrap(), 3);
    }
}
