//! Terminal operator channel
//!
//! Prints presentations to a writer (stdout by default) and reads replies
//! line by line. Controls and attachment choices are numbered from 1 on
//! screen; a decision may also be typed by name.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use super::{
    ChannelEvent, ChannelResult, OperatorChannel, OperatorReply, Presentation, PresentationHandle,
    ReplyKind,
};
use crate::approval::ReplyInbox;
use crate::models::{Attachment, Decision};

#[derive(Default)]
struct ConsoleState {
    current: Option<PresentationHandle>,
    controls: Vec<Decision>,
    choices: usize,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Operator channel on a terminal
pub struct ConsoleChannel {
    out: tokio::sync::Mutex<Writer>,
    state: Arc<Mutex<ConsoleState>>,
}

impl ConsoleChannel {
    /// Console channel writing to stdout
    pub fn stdout() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Console channel writing to any async writer
    pub fn with_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            out: tokio::sync::Mutex::new(Box::new(writer)),
            state: Arc::new(Mutex::new(ConsoleState::default())),
        }
    }

    async fn write(&self, text: &str) -> ChannelResult<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    /// Read replies from stdin until EOF
    pub fn spawn_stdin_reader(&self, inbox: ReplyInbox) -> JoinHandle<()> {
        self.spawn_reader(BufReader::new(tokio::io::stdin()), inbox)
    }

    /// Read replies from `reader` until EOF, delivering them into `inbox`
    ///
    /// Each line is interpreted according to the question currently pending
    /// in the inbox; lines typed while nothing is pending are ignored.
    pub fn spawn_reader<R>(&self, reader: R, inbox: ReplyInbox) -> JoinHandle<()>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Console input failed");
                        break;
                    }
                };

                let Some(key) = inbox.pending() else {
                    tracing::debug!("Console input with no pending question ignored");
                    continue;
                };

                let reply = {
                    let state = state.lock();
                    parse_reply(key.kind, &line, &state.controls, state.choices)
                };

                match reply {
                    Some(reply) => {
                        inbox.deliver(ChannelEvent::new(key.handle, reply));
                    }
                    None => {
                        tracing::info!(input = %line.trim(), kind = key.kind.as_str(), "Unrecognised console input");
                    }
                }
            }
            tracing::debug!("Console reader finished");
        })
    }
}

/// Interpret one line of console input as a reply of `kind`
pub fn parse_reply(
    kind: ReplyKind,
    line: &str,
    controls: &[Decision],
    choices: usize,
) -> Option<OperatorReply> {
    let input = line.trim();
    if input.is_empty() {
        return None;
    }

    match kind {
        ReplyKind::Decision => {
            let decision = match input.parse::<usize>() {
                Ok(n) if (1..=controls.len()).contains(&n) => Some(controls[n - 1]),
                Ok(_) => None,
                Err(_) => Decision::from_str(input).filter(|d| controls.contains(d)),
            };
            decision.map(OperatorReply::Decision)
        }
        ReplyKind::Text => Some(OperatorReply::Text(input.to_string())),
        ReplyKind::AttachmentChoice => match input.parse::<usize>() {
            Ok(n) if (1..=choices).contains(&n) => Some(OperatorReply::AttachmentChoice(n - 1)),
            _ => None,
        },
    }
}

fn render_presentation(presentation: &Presentation) -> String {
    let mut text = format!(
        "\n=== [{}] round {} ===\n",
        presentation.topic, presentation.round
    );
    if !presentation.draft.title.is_empty() {
        text.push_str(&format!("{}\n\n", presentation.draft.title));
    }
    text.push_str(&presentation.draft.body);
    text.push('\n');

    match &presentation.attachment {
        Some(attachment) => text.push_str(&format!("\n📎 {attachment}\n")),
        None => text.push_str("\n📎 (no media)\n"),
    }

    text.push('\n');
    for (i, decision) in presentation.controls.iter().enumerate() {
        text.push_str(&format!("  {}) {}\n", i + 1, decision.label()));
    }
    text.push_str("> ");
    text
}

#[async_trait]
impl OperatorChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn present(&self, presentation: &Presentation) -> ChannelResult<PresentationHandle> {
        let handle = PresentationHandle::generate();
        {
            let mut state = self.state.lock();
            state.current = Some(handle.clone());
            state.controls = presentation.controls.clone();
            state.choices = 0;
        }
        self.write(&render_presentation(presentation)).await?;
        Ok(handle)
    }

    async fn invalidate_controls(&self, handle: &PresentationHandle) -> ChannelResult<()> {
        let mut state = self.state.lock();
        if state.current.as_ref() == Some(handle) {
            state.current = None;
            state.controls.clear();
            state.choices = 0;
        }
        Ok(())
    }

    async fn request_text(&self, _handle: &PresentationHandle, prompt: &str) -> ChannelResult<()> {
        self.write(&format!("✏️ {prompt}\n> ")).await
    }

    async fn present_attachments(
        &self,
        _handle: &PresentationHandle,
        choices: &[Attachment],
    ) -> ChannelResult<()> {
        self.state.lock().choices = choices.len();

        let mut text = String::from("📷 Choose media:\n");
        for (i, attachment) in choices.iter().enumerate() {
            text.push_str(&format!("  {}) {}\n", i + 1, attachment));
        }
        text.push_str("> ");
        self.write(&text).await
    }

    async fn notify(&self, message: &str) -> ChannelResult<()> {
        self.write(&format!("{message}\n")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::CorrelationKey;
    use crate::models::Draft;
    use std::time::Duration;

    const CONTROLS: [Decision; 3] = [Decision::Approve, Decision::Edit, Decision::Cancel];

    #[test]
    fn test_parse_decision_by_number_and_name() {
        assert_eq!(
            parse_reply(ReplyKind::Decision, "2", &CONTROLS, 0),
            Some(OperatorReply::Decision(Decision::Edit))
        );
        assert_eq!(
            parse_reply(ReplyKind::Decision, "cancel\n", &CONTROLS, 0),
            Some(OperatorReply::Decision(Decision::Cancel))
        );
        // Not offered
        assert_eq!(parse_reply(ReplyKind::Decision, "regenerate", &CONTROLS, 0), None);
        assert_eq!(parse_reply(ReplyKind::Decision, "4", &CONTROLS, 0), None);
        assert_eq!(parse_reply(ReplyKind::Decision, "0", &CONTROLS, 0), None);
    }

    #[test]
    fn test_parse_text_and_choice() {
        assert_eq!(
            parse_reply(ReplyKind::Text, "  new body  ", &[], 0),
            Some(OperatorReply::Text("new body".into()))
        );
        assert_eq!(parse_reply(ReplyKind::Text, "   ", &[], 0), None);
        assert_eq!(
            parse_reply(ReplyKind::AttachmentChoice, "1", &[], 2),
            Some(OperatorReply::AttachmentChoice(0))
        );
        assert_eq!(parse_reply(ReplyKind::AttachmentChoice, "3", &[], 2), None);
    }

    #[test]
    fn test_render_presentation() {
        let text = render_presentation(&Presentation {
            topic: "rust".into(),
            draft: Draft::new("Title", "Body"),
            attachment: None,
            controls: CONTROLS.to_vec(),
            round: 2,
        });
        assert!(text.contains("[rust] round 2"));
        assert!(text.contains("1) ✅ Publish"));
        assert!(text.contains("(no media)"));
    }

    #[tokio::test]
    async fn test_reader_delivers_to_pending_question() {
        let channel = ConsoleChannel::with_writer(tokio::io::sink());
        let presentation = Presentation {
            topic: "t".into(),
            draft: Draft::new("", "b"),
            attachment: None,
            controls: CONTROLS.to_vec(),
            round: 1,
        };
        let handle = channel.present(&presentation).await.unwrap();

        let inbox = ReplyInbox::new();
        let waiter = {
            let inbox = inbox.clone();
            let key = CorrelationKey::new(handle.clone(), ReplyKind::Decision);
            tokio::spawn(async move { inbox.wait(key, Duration::from_secs(5)).await })
        };
        while inbox.pending().is_none() {
            tokio::task::yield_now().await;
        }

        let (mut tx, rx) = tokio::io::duplex(64);
        let reader = channel.spawn_reader(BufReader::new(rx), inbox);
        tx.write_all(b"1\n").await.unwrap();
        drop(tx);

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(
            outcome.into_matched(),
            Some(OperatorReply::Decision(Decision::Approve))
        );
        reader.await.unwrap();
    }
}
