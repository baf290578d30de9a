//! Async driver tying the transport to the controller.
//!
//! The controller is synchronous and runs on a virtual clock. A
//! [`Conversation`] maps that clock onto tokio time: it waits for whichever
//! comes first, the next inbound event or the controller's next deadline,
//! and feeds it in.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::controller::{Controller, MessageId};
use crate::error::Result;
use crate::transport::{ChatClient, InboundEvent, InboundStream};

enum Wake {
    Event(Option<InboundEvent>),
    Timer,
}

pub struct Conversation {
    controller: Controller,
    client: ChatClient,
    session_id: String,
    inbound: Option<InboundStream>,
    epoch: Instant,
}

impl Conversation {
    /// `session_id` of `None` picks a random one.
    pub fn new(controller: Controller, client: ChatClient, session_id: Option<String>) -> Self {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            controller,
            client,
            session_id,
            inbound: None,
            epoch: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// True while a stream is open or a timer is pending.
    pub fn is_busy(&self) -> bool {
        self.inbound.as_ref().is_some_and(InboundStream::is_open)
            || self.controller.next_deadline().is_some()
    }

    /// Submit `prompt` and open its reply stream. Any message still in
    /// flight is cancelled first.
    ///
    /// # Errors
    /// Submission and stream-open failures are returned after the matching
    /// notice has been shown on the new message.
    pub async fn start(&mut self, prompt: &str) -> Result<MessageId> {
        if let Some(mut previous) = self.inbound.take() {
            previous.close();
        }
        let now = self.elapsed();
        self.controller.advance_to(now);
        let id = self.controller.begin_message(prompt);
        tracing::info!(message = id, session_id = %self.session_id, "sending prompt");

        if let Err(e) = self.client.submit(prompt, &self.session_id).await {
            self.controller.fail_submit(&e);
            return Err(e);
        }
        match self.client.open_stream(&self.session_id).await {
            Ok(stream) => {
                self.inbound = Some(stream);
                Ok(id)
            }
            Err(e) => {
                self.controller.fail_current(&e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for and apply one event or timer. Returns `false` when there is
    /// nothing left to wait for.
    pub async fn pump(&mut self) -> bool {
        let epoch = self.epoch;
        let deadline = self.controller.next_deadline();
        let wake = match self.inbound.as_mut().filter(|s| s.is_open()) {
            Some(stream) => {
                let timer = async move {
                    match deadline {
                        Some(d) => sleep_until(epoch + d).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    event = stream.next() => Wake::Event(event),
                    () = timer => Wake::Timer,
                }
            }
            None => match deadline {
                Some(d) => {
                    sleep_until(epoch + d).await;
                    Wake::Timer
                }
                None => return false,
            },
        };

        let now = self.elapsed();
        self.controller.advance_to(now);
        if let Wake::Event(Some(event)) = wake {
            self.controller.handle(event);
        }
        true
    }

    /// Drive the current message until it needs nothing further.
    pub async fn drain(&mut self) {
        while self.pump().await {}
    }

    /// Send one prompt and drive its reply to completion.
    pub async fn send(&mut self, prompt: &str) -> Result<()> {
        self.start(prompt).await?;
        self.drain().await;
        Ok(())
    }

    /// Read prompts line by line until EOF. A prompt arriving while the
    /// previous reply is still streaming cancels that reply.
    ///
    /// # Errors
    /// Only read errors on `reader` end the loop; failed messages are shown
    /// and logged.
    pub async fn run_interactive<R>(&mut self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = LinesStream::new(reader.lines());
        loop {
            let next = if self.is_busy() {
                tokio::select! {
                    line = lines.next() => line,
                    _ = self.pump() => continue,
                }
            } else {
                lines.next().await
            };
            let Some(line) = next.transpose()? else {
                break;
            };
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            if let Err(e) = self.start(prompt).await {
                tracing::warn!(error = %e, "prompt failed");
            }
        }
        self.drain().await;
        Ok(())
    }
}
