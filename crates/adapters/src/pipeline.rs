//! Production `ByteFilterPipeline`: a chain of user-configured filter processes wired together
//! with OS pipes, in the style of the `CommandExecutor`/`GitWorker<E>` generic-process-spawning
//! pattern (`daemon/src/git/worker.rs`), adapted from "spawn a git subcommand" to "spawn an
//! arbitrary filter chain".

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use coldsnap_planner::{ByteFilterPipeline, PlannerError};

use crate::error::AdapterError;

/// One shell word per configured `pipe_through` command, e.g. `["zstd", "-T0"]`.
pub struct ProcessPipeline {
    commands: Vec<Vec<String>>,
}

impl ProcessPipeline {
    pub fn new(commands: Vec<Vec<String>>) -> Self {
        Self { commands }
    }
}

impl ByteFilterPipeline for ProcessPipeline {
    fn spawn(&self) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>), PlannerError> {
        if self.commands.is_empty() {
            let (reader, writer) = os_pipe::pipe().map_err(AdapterError::Io)?;
            return Ok((Box::new(writer), Box::new(reader)));
        }

        let mut children = Vec::with_capacity(self.commands.len());
        let mut head_stdin = None;
        let mut prev_stdout: Option<os_pipe::PipeReader> = None;

        for (i, argv) in self.commands.iter().enumerate() {
            let Some((program, args)) = argv.split_first() else {
                return Err(AdapterError::PipelineSpawn {
                    command: argv.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty pipe_through command"),
                }
                .into());
            };
            let mut command = Command::new(program);
            command.args(args);

            let stdin = if let Some(reader) = prev_stdout.take() {
                Stdio::from(reader)
            } else {
                Stdio::piped()
            };
            command.stdin(stdin).stdout(Stdio::piped()).stderr(Stdio::inherit());

            let mut child = command
                .spawn()
                .map_err(|source| AdapterError::PipelineSpawn { command: argv.clone(), source })?;

            if i == 0 {
                head_stdin = child.stdin.take();
            }
            prev_stdout = child.stdout.take().map(os_pipe::PipeReader::from);
            children.push(child);
        }

        let writer = head_stdin.expect("first filter command always owns stdin");
        let reader = prev_stdout.expect("last filter command always owns stdout");
        Ok((Box::new(writer), Box::new(ReaperReader { inner: reader, children })))
    }
}

/// Wraps the tail process's stdout; reaps every spawned child on drop so a filter chain never
/// outlives the upload that consumes it.
struct ReaperReader {
    inner: os_pipe::PipeReader,
    children: Vec<std::process::Child>,
}

impl Read for ReaperReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for ReaperReader {
    fn drop(&mut self) {
        for child in &mut self.children {
            let _ = child.wait();
        }
    }
}
