//! Message lifecycle controller.
//!
//! Every message lives in its own [`MessageSession`]: typewriter queue,
//! accumulated text, render target and timers. Starting a message cancels the
//! previous session's timers before anything else, so no reveal step or
//! diagram dispatch of an old message can fire into a new one. Wakeups carry
//! the id of the message that scheduled them; a wakeup for any other message
//! is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::decorate::decorate;
use crate::diagram::{find_first_diagram, DiagramSink, DiagramSource};
use crate::render::{CmarkRenderer, Frame, MarkdownRenderer, RenderTarget, Surface};
use crate::scheduler::{TimerHandle, TimerQueue};
use crate::transport::InboundEvent;
use crate::typewriter::{Step, Typewriter};

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wakeup {
    Reveal(MessageId),
    DiagramSettle(MessageId),
}

/// State of a message's inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    /// The sentinel arrived.
    Ended,
    /// The transport failed; the error notice is displayed.
    Failed,
}

/// Timing and diagram settings used by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub reveal_interval: Duration,
    pub diagram_settle: Duration,
    pub diagram_language: String,
    pub error_notice: String,
    /// Prefix of the notice shown when the prompt could not be sent; the
    /// error text follows it.
    pub submit_notice: String,
    pub diagrams_enabled: bool,
}

impl From<&ChatConfig> for ControllerSettings {
    fn from(cfg: &ChatConfig) -> Self {
        Self {
            reveal_interval: cfg.reveal_interval(),
            diagram_settle: cfg.diagram_settle(),
            diagram_language: cfg.diagram_language.clone(),
            error_notice: cfg.error_notice.clone(),
            submit_notice: cfg.submit_error_notice.clone(),
            diagrams_enabled: cfg.diagrams_enabled,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// Counters across all messages handled by one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub messages: u64,
    pub terminal_renders: u64,
    pub failed_messages: u64,
    pub diagrams_dispatched: u64,
    pub diagram_failures: u64,
    pub stale_wakeups: u64,
}

/// Read-only view of the active message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub text: String,
    pub html: String,
    pub stream: StreamState,
    pub finished: bool,
    pub pending_tokens: usize,
}

/// Everything owned by one message.
struct MessageSession {
    id: MessageId,
    typewriter: Typewriter,
    target: Box<dyn RenderTarget>,
    reveal_timer: Option<TimerHandle>,
    settle_timer: Option<TimerHandle>,
    pending_diagram: Option<DiagramSource>,
    stream: StreamState,
    /// Terminal pipeline ran, or was skipped because the stream failed.
    finished: bool,
}

impl MessageSession {
    fn new(id: MessageId, target: Box<dyn RenderTarget>) -> Self {
        Self {
            id,
            typewriter: Typewriter::new(),
            target,
            reveal_timer: None,
            settle_timer: None,
            pending_diagram: None,
            stream: StreamState::Streaming,
            finished: false,
        }
    }
}

pub struct Controller {
    renderer: Box<dyn MarkdownRenderer>,
    surface: Box<dyn Surface>,
    sink: Box<dyn DiagramSink>,
    settings: ControllerSettings,
    timers: TimerQueue<Wakeup>,
    current: Option<MessageSession>,
    next_id: MessageId,
    stats: ControllerStats,
}

impl Controller {
    pub fn builder(settings: ControllerSettings) -> ControllerBuilder {
        ControllerBuilder::new(settings)
    }

    /// Start a new message, discarding the previous one.
    ///
    /// Pending reveal and diagram timers of the previous message are
    /// cancelled and its queued tokens are dropped with it.
    pub fn begin_message(&mut self, prompt: &str) -> MessageId {
        if let Some(prev) = self.current.take() {
            for handle in [prev.reveal_timer, prev.settle_timer].iter().flatten() {
                self.timers.cancel(handle);
            }
            if !prev.finished {
                tracing::info!(
                    message = prev.id,
                    pending_tokens = prev.typewriter.pending(),
                    "previous message superseded"
                );
            }
        }
        self.next_id += 1;
        let id = self.next_id;
        let target = self.surface.create_target(prompt);
        self.current = Some(MessageSession::new(id, target));
        self.stats.messages += 1;
        id
    }

    /// Apply one inbound event to the active message.
    pub fn handle(&mut self, event: InboundEvent) {
        let Some(session) = self.current.as_mut() else {
            tracing::debug!(?event, "no active message, event dropped");
            return;
        };
        if session.stream != StreamState::Streaming {
            tracing::debug!(message = session.id, ?event, "stream already closed, event dropped");
            return;
        }
        match event {
            InboundEvent::Delta(text) => {
                if session.typewriter.enqueue(&text) {
                    self.reveal_step();
                }
            }
            InboundEvent::Done => {
                session.stream = StreamState::Ended;
                if !session.typewriter.is_cycling() {
                    self.finish();
                }
            }
            InboundEvent::Failed(reason) => {
                let notice = self.settings.error_notice.clone();
                self.fail(&reason, &notice);
            }
            InboundEvent::Ignored => {}
        }
    }

    /// Move the virtual clock to `now` and fire every due wakeup, including
    /// wakeups scheduled by the ones fired here.
    pub fn advance_to(&mut self, now: Duration) {
        let mut due: VecDeque<Wakeup> = self.timers.advance_to(now).into();
        while let Some(wakeup) = due.pop_front().or_else(|| self.timers.pop_due()) {
            self.fire(wakeup);
        }
    }

    fn fire(&mut self, wakeup: Wakeup) {
        let current = self.current_id();
        match wakeup {
            Wakeup::Reveal(id) if Some(id) == current => {
                if let Some(session) = self.current.as_mut() {
                    session.reveal_timer = None;
                }
                self.reveal_step();
            }
            Wakeup::DiagramSettle(id) if Some(id) == current => self.dispatch_diagram(),
            stale => {
                self.stats.stale_wakeups += 1;
                tracing::debug!(?stale, "wakeup for inactive message ignored");
            }
        }
    }

    /// Reveal one token, or end the cycle when the queue is empty.
    fn reveal_step(&mut self) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        match session.typewriter.step(self.renderer.as_ref()) {
            Step::Revealed => {
                session.target.show(&session.typewriter.frame(false));
                let handle = self
                    .timers
                    .schedule(self.settings.reveal_interval, Wakeup::Reveal(session.id));
                session.reveal_timer = Some(handle);
            }
            Step::Drained if session.stream == StreamState::Ended => self.finish(),
            Step::Drained => {
                // Caught up with the network; show a full render and idle
                // until the next delta restarts the cycle.
                session.typewriter.render_full(self.renderer.as_ref());
                session.target.show(&session.typewriter.frame(false));
            }
        }
    }

    /// Terminal render: full render, decorations, complete frame, then
    /// diagram detection. Runs at most once per message.
    fn finish(&mut self) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        if session.finished {
            return;
        }
        session.finished = true;

        let html = session.typewriter.render_full(self.renderer.as_ref());
        let decorated = decorate(html, &self.settings.diagram_language);
        session.target.show(&Frame {
            text: session.typewriter.text().to_string(),
            html: decorated.clone(),
            complete: true,
        });
        self.stats.terminal_renders += 1;
        tracing::info!(
            message = session.id,
            bytes = session.typewriter.text().len(),
            "message complete"
        );

        if !self.settings.diagrams_enabled {
            return;
        }
        if let Some(source) = find_first_diagram(&decorated, &self.settings.diagram_language) {
            tracing::debug!(message = session.id, "diagram block detected");
            session.pending_diagram = Some(source);
            let handle = self
                .timers
                .schedule(self.settings.diagram_settle, Wakeup::DiagramSettle(session.id));
            session.settle_timer = Some(handle);
        }
    }

    fn dispatch_diagram(&mut self) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        session.settle_timer = None;
        let Some(source) = session.pending_diagram.take() else {
            return;
        };
        let sanitized = source.sanitize(&self.settings.diagram_language);
        match self.sink.show(&sanitized) {
            Ok(()) => self.stats.diagrams_dispatched += 1,
            Err(e) => {
                self.stats.diagram_failures += 1;
                tracing::error!(message = session.id, error = %e, "diagram dispatch failed");
            }
        }
    }

    /// Transport failure: stop revealing and show `notice` instead of the
    /// message. The terminal pipeline does not run.
    fn fail(&mut self, reason: &str, notice: &str) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        tracing::error!(message = session.id, %reason, "reply stream failed");
        if let Some(handle) = session.reveal_timer.take() {
            self.timers.cancel(&handle);
        }
        session.typewriter.halt();
        session.stream = StreamState::Failed;
        session.finished = true;
        session.target.show_notice(notice);
        self.stats.failed_messages += 1;
    }

    fn streaming(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.stream == StreamState::Streaming)
    }

    /// Fail the active message from outside the event stream, e.g. when its
    /// reply stream could not be opened. Shows the stream error notice.
    pub fn fail_current(&mut self, reason: &str) {
        if self.streaming() {
            let notice = self.settings.error_notice.clone();
            self.fail(reason, &notice);
        }
    }

    /// The prompt of the active message was never delivered. Shows the
    /// submit notice followed by `error`.
    pub fn fail_submit(&mut self, error: &dyn fmt::Display) {
        if self.streaming() {
            let reason = error.to_string();
            let notice = format!("{}{}", self.settings.submit_notice, reason);
            self.fail(&reason, &notice);
        }
    }

    /// Deadline of the next wakeup on the controller's virtual clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// True when the active message needs nothing further: its stream is
    /// closed, the terminal render ran (or was skipped) and no timer is left.
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.current.as_ref().map_or(true, |s| s.finished)
    }

    /// True while the active message still expects inbound events.
    pub fn stream_open(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.stream == StreamState::Streaming)
    }

    pub fn current_id(&self) -> Option<MessageId> {
        self.current.as_ref().map(|s| s.id)
    }

    pub fn snapshot(&self) -> Option<MessageSnapshot> {
        self.current.as_ref().map(|s| MessageSnapshot {
            id: s.id,
            text: s.typewriter.text().to_string(),
            html: s.typewriter.html().to_string(),
            stream: s.stream,
            finished: s.finished,
            pending_tokens: s.typewriter.pending(),
        })
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }
}

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    settings: ControllerSettings,
    renderer: Option<Box<dyn MarkdownRenderer>>,
    surface: Option<Box<dyn Surface>>,
    sink: Option<Box<dyn DiagramSink>>,
}

impl ControllerBuilder {
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            settings,
            renderer: None,
            surface: None,
            sink: None,
        }
    }

    /// Markdown renderer (default: [`CmarkRenderer`]).
    pub fn renderer(mut self, renderer: impl MarkdownRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Surface that creates one render target per message. Required.
    pub fn surface(mut self, surface: impl Surface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Destination for sanitized diagrams. Required.
    pub fn sink(mut self, sink: impl DiagramSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// # Errors
    /// Returns `Err` naming the first missing required part.
    pub fn build(self) -> Result<Controller, &'static str> {
        let surface = self.surface.ok_or("surface is required")?;
        let sink = self.sink.ok_or("sink is required")?;
        Ok(Controller {
            renderer: self
                .renderer
                .unwrap_or_else(|| Box::new(CmarkRenderer::new())),
            surface,
            sink,
            settings: self.settings,
            timers: TimerQueue::new(),
            current: None,
            next_id: 0,
            stats: ControllerStats::default(),
        })
    }
}
