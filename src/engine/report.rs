//! Renders [ExecutionResult]s into the labeled transcript the operator sees.
//!
//! The [Engine] calls [Report::report] once per member, always in fleet order. In sequential mode
//! that happens as each member finishes; in concurrent mode it happens after every member has
//! finished. A [Report] implementation therefore never has to reorder anything.
//!
//! [Engine]: crate::engine::Engine

use crate::engine::{ExecutionResult, Status};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Receives the outcome of each fleet member.
#[async_trait]
pub trait Report: Send {
    async fn report(&mut self, result: &ExecutionResult) -> io::Result<()>;
}

/// The production [Report] implementation: writes transcript blocks to a writer, usually stdout.
#[derive(Debug)]
pub struct Transcript<W> {
    writer: W,
}

impl Transcript<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> Transcript<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Report for Transcript<W> {
    async fn report(&mut self, result: &ExecutionResult) -> io::Result<()> {
        // One write per block keeps a block intact even if something else writes to stdout.
        self.writer.write_all(render(result).as_bytes()).await?;
        self.writer.flush().await
    }
}

/// The separator line that opens a member's block.
pub fn label(alias: &str) -> String {
    format!("+++{alias}:")
}

/// Renders one member's transcript block.
///
/// The block is the [label] line, the captured output, a status line if the member did not
/// succeed, and a blank line.
///
/// ```
/// # use oknav::engine::{report, ExecutionResult, Status};
/// let result = ExecutionResult {
///     index: 0,
///     alias: "ok0".into(),
///     status: Status::Timeout,
///     output: "partial\n".into(),
/// };
/// assert_eq!("+++ok0:\npartial\nok0: connection timeout\n\n", report::render(&result));
/// ```
pub fn render(result: &ExecutionResult) -> String {
    let mut block = label(&result.alias);
    block.push('\n');

    block.push_str(&result.output);
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        block.push('\n');
    }

    if result.status != Status::Success {
        // Writing to a String can't fail.
        let _ = writeln!(block, "{}: {}", result.alias, result.status);
    }

    block.push('\n');
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;

    fn result(alias: &str, status: Status, output: &str) -> ExecutionResult {
        ExecutionResult {
            index: 0,
            alias: alias.into(),
            status,
            output: output.into(),
        }
    }

    mod render {
        use super::*;

        #[test]
        fn success() {
            let block = render(&result("a1", Status::Success, "up 3 days\n"));
            assert_eq!("+++a1:\nup 3 days\n\n", block);
        }

        #[test]
        fn adds_missing_trailing_newline() {
            let block = render(&result("a1", Status::Success, "no newline"));
            assert_eq!("+++a1:\nno newline\n\n", block);
        }

        #[test]
        fn empty_output() {
            let block = render(&result("a1", Status::Success, ""));
            assert_eq!("+++a1:\n\n", block);
        }

        #[test]
        fn remote_failure() {
            let block = render(&result("a1", Status::RemoteNonzero(2), "ls: nope\n"));
            assert_eq!("+++a1:\nls: nope\na1: exit code 2\n\n", block);
        }

        #[test]
        fn wrapper_error() {
            let block = render(&result("a1", Status::WrapperError, ""));
            assert_eq!("+++a1:\na1: timeout wrapper error\n\n", block);
        }

        #[test]
        fn resolution_failure() {
            let status = Status::ResolutionFailure(ResolveError::LocalOnlyViolation {
                alias: "e1".into(),
                required: "workstation".into(),
                actual: "laptop".into(),
            });
            let block = render(&result("e1", status, ""));
            assert_eq!(
                "+++e1:\ne1: e1 may only be used from workstation, but this host is laptop\n\n",
                block,
            );
        }
    }

    #[tokio::test]
    async fn transcript_appends_blocks() {
        let mut transcript = Transcript::new(Vec::new());
        transcript
            .report(&result("a1", Status::Success, "one\n"))
            .await
            .unwrap();
        transcript
            .report(&result("c1", Status::Timeout, ""))
            .await
            .unwrap();

        let text = String::from_utf8(transcript.into_inner()).unwrap();
        assert_eq!("+++a1:\none\n\n+++c1:\nc1: connection timeout\n\n", text);
    }
}
