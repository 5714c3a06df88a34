//! Background draining of child process stderr.

use std::collections::VecDeque;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Lines of stderr kept for error reports.
const TAIL_LINES: usize = 20;

/// Read `stderr` to its end on a separate task, keeping the last lines.
///
/// A child writing more than the pipe buffer would otherwise block while
/// its stdout is still being read.
pub(crate) fn drain_stderr<R>(stderr: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        while let Ok(Some(line)) = reader.next_line().await {
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}

/// Collect the drained tail, or an empty string if nothing was captured.
pub(crate) async fn collect(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_only_the_tail() {
        let text: String = (1..=100).map(|i| format!("line {i}\n")).collect();
        let tail = drain_stderr(std::io::Cursor::new(text.into_bytes()))
            .await
            .unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), TAIL_LINES);
        assert_eq!(lines.first(), Some(&"line 81"));
        assert_eq!(lines.last(), Some(&"line 100"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_noisy_child_runs_to_completion() {
        use std::process::Stdio;
        use std::time::Duration;
        use tokio::io::AsyncReadExt;

        // Far more stderr than a pipe buffers, then a line on stdout.
        let mut child = tokio::process::Command::new("sh")
            .args([
                "-c",
                "i=0; while [ $i -lt 4000 ]; do echo 'noise noise noise noise noise' >&2; i=$((i+1)); done; echo done",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let drain = drain_stderr(child.stderr.take().unwrap());
        let mut stdout = String::new();
        let mut pipe = child.stdout.take().unwrap();

        tokio::time::timeout(Duration::from_secs(30), pipe.read_to_string(&mut stdout))
            .await
            .expect("child blocked on stderr")
            .unwrap();
        assert!(child.wait().await.unwrap().success());
        assert_eq!(stdout.trim(), "done");
        assert_eq!(collect(Some(drain)).await.lines().count(), TAIL_LINES);
    }
}
