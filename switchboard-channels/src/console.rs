//! Local console channel
//!
//! Reads one message per input line and writes replies back as plain text.
//! Used for running the gateway without any networked chat platform.

use crate::base::{BaseChannel, ChannelError, ChannelHandler, Result};
use crate::common::split_message;
use crate::typing::TypingIndicators;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::bus::{ChannelSender, MessageBus, OutboundMessage};
use switchboard_core::config::schema::ConsoleConfig;
use switchboard_core::DeliveryError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TYPING_INTERVAL: Duration = Duration::from_secs(8);
const TYPING_MARKER: &str = "…\n";

type ConsoleReader = Box<dyn AsyncBufRead + Send + Unpin>;
type ConsoleOutput = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Where console lines come from
enum ConsoleInput {
    /// Process stdin, read on a dedicated thread once the channel starts
    Stdin,
    Reader(ConsoleReader),
    Forwarded(mpsc::UnboundedReceiver<String>),
}

/// Line source owned by the ingestion task
enum LineSource {
    Reader(ConsoleReader),
    /// Lines forwarded by the stdin thread, newline included
    Forwarded(mpsc::UnboundedReceiver<String>),
}

impl LineSource {
    /// Append the next line to `buf`. Returns 0 at end of input.
    async fn read_line(&mut self, buf: &mut String) -> std::io::Result<usize> {
        match self {
            Self::Reader(reader) => reader.read_line(buf).await,
            Self::Forwarded(rx) => match rx.recv().await {
                Some(line) => {
                    buf.push_str(&line);
                    Ok(line.len())
                }
                None => Ok(0),
            },
        }
    }
}

/// Read stdin on a detached thread.
///
/// A blocking stdin read cannot be interrupted, so it must not run on the
/// runtime's blocking pool: the runtime would wait for it on shutdown. The
/// thread ends at end of input or once the receiver is dropped and the next
/// line arrives; the process may exit while it is still blocked.
fn forward_stdin() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Console stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to spawn console input thread: {}", e);
    }
    rx
}

/// Console channel handler
pub struct ConsoleHandler {
    config: ConsoleConfig,
    base: BaseChannel,
    max_message_length: usize,
    /// Taken by the ingestion task on start
    input: parking_lot::Mutex<Option<ConsoleInput>>,
    output: ConsoleOutput,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    typing: Arc<TypingIndicators>,
}

impl ConsoleHandler {
    /// Create a console handler bound to the process stdin/stdout
    pub fn new(config: &ConsoleConfig, bus: MessageBus, max_message_length: usize) -> Self {
        Self::build(
            config,
            bus,
            max_message_length,
            ConsoleInput::Stdin,
            Box::new(tokio::io::stdout()),
        )
    }

    /// Create a console handler over arbitrary streams
    pub fn with_io(
        config: &ConsoleConfig,
        bus: MessageBus,
        max_message_length: usize,
        input: ConsoleReader,
        output: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self::build(
            config,
            bus,
            max_message_length,
            ConsoleInput::Reader(input),
            output,
        )
    }

    fn build(
        config: &ConsoleConfig,
        bus: MessageBus,
        max_message_length: usize,
        input: ConsoleInput,
        output: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        let output: ConsoleOutput = Arc::new(Mutex::new(output));
        let typing_output = output.clone();
        let typing = TypingIndicators::new(TYPING_INTERVAL, move |_chat_id| {
            let output = typing_output.clone();
            async move {
                let mut out = output.lock().await;
                if let Err(e) = write_flush(&mut out, TYPING_MARKER).await {
                    tracing::debug!("Console typing indicator failed: {}", e);
                }
            }
        });

        Self {
            config: config.clone(),
            base: BaseChannel::new("console", config.allow_from.clone(), bus),
            max_message_length,
            input: parking_lot::Mutex::new(Some(input)),
            output,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            reader_task: parking_lot::Mutex::new(None),
            typing: Arc::new(typing),
        }
    }

    async fn read_loop(
        mut input: LineSource,
        base: BaseChannel,
        config: ConsoleConfig,
        typing: Arc<TypingIndicators>,
        shutdown: CancellationToken,
    ) {
        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                read = input.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => {
                    tracing::info!("Console input closed");
                    break;
                }
                Ok(_) => {
                    let content = line.trim();
                    if content.is_empty() {
                        continue;
                    }
                    match base.handle_message(
                        config.sender_id.clone(),
                        config.chat_id.clone(),
                        content,
                        Vec::new(),
                        None,
                    ) {
                        Ok(()) => {
                            if config.show_typing {
                                typing.start(&config.chat_id);
                            }
                        }
                        Err(e) => tracing::warn!("Console message dropped: {}", e),
                    }
                }
                Err(e) => {
                    tracing::warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    }
}

async fn write_flush(
    out: &mut Box<dyn AsyncWrite + Send + Unpin>,
    text: &str,
) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

#[async_trait]
impl ChannelSender for ConsoleHandler {
    async fn send(&self, msg: OutboundMessage) -> std::result::Result<(), DeliveryError> {
        if self.shutdown.is_cancelled() {
            return Err(DeliveryError::NotRunning(self.base.name.clone()));
        }
        self.typing.stop(&msg.chat_id);

        let mut text = String::new();
        for chunk in split_message(&msg.content, self.max_message_length) {
            text.push_str(&chunk);
            text.push('\n');
        }
        for path in &msg.media {
            text.push_str(&format!("[attachment: {}]\n", path));
        }

        let mut out = self.output.lock().await;
        write_flush(&mut out, &text).await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for ConsoleHandler {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ChannelError::NotRunning("console was stopped".to_string()));
        }
        let input = self
            .input
            .lock()
            .take()
            .ok_or_else(|| ChannelError::Error("Console input already in use".to_string()))?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let source = match input {
            ConsoleInput::Stdin => LineSource::Forwarded(forward_stdin()),
            ConsoleInput::Reader(reader) => LineSource::Reader(reader),
            ConsoleInput::Forwarded(rx) => LineSource::Forwarded(rx),
        };
        let reader = Self::read_loop(
            source,
            self.base.clone(),
            self.config.clone(),
            self.typing.clone(),
            self.shutdown.clone(),
        );
        let handle = tokio::spawn(async move {
            reader.await;
            running.store(false, Ordering::SeqCst);
        });
        *self.reader_task.lock() = Some(handle);

        tracing::info!("Console channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();
        self.typing.stop_all();

        let handle = self.reader_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Console reader ended abnormally: {}", e);
            }
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.base.is_allowed(sender_id)
    }
}
