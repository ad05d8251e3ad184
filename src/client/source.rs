//! Line-oriented output of a child process

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::error::{Error, Result};

/// Splits a byte stream into lines, keeping the trailing `\n`
///
/// Invalid UTF-8 is replaced rather than rejected so that one bad byte does
/// not end the stream.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(256),
        }
    }

    /// Next line, or `None` at end of stream. The final line may lack a
    /// newline.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// A spawned command whose stdout is read line by line
///
/// The child is killed if the source is dropped before it exits.
pub struct LineSource {
    child: Child,
    lines: LineReader<ChildStdout>,
}

impl LineSource {
    /// Spawn `command[0]` with the remaining elements as arguments
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or(Error::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "child stdout was not captured",
            ))
        })?;

        tracing::debug!(program = %program, pid = ?child.id(), "Spawned command");

        Ok(Self {
            child,
            lines: LineReader::new(stdout),
        })
    }

    pub async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Kill the process
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Failed to kill command");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_lines_keep_newline() {
        let mock = Builder::new().read(b"hi\nthere\n").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("hi\n"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("there\n"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = Builder::new().read(b"par").read(b"tial\nlast").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("partial\n"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_replaced() {
        let mock = Builder::new().read(b"a\xffb\n").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some("a\u{fffd}b\n")
        );
    }

    #[tokio::test]
    async fn test_spawn_empty_command() {
        assert!(matches!(LineSource::spawn(&[]), Err(Error::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_spawn_echo() {
        let command = vec!["echo".to_string(), "hi".to_string()];
        let mut source = LineSource::spawn(&command).unwrap();

        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("hi\n"));
        assert_eq!(source.next_line().await.unwrap(), None);
        assert!(source.wait().await.unwrap().success());
    }
}
