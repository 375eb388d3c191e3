//! One controller connection: verb calls out, frames in.
//!
//! Every verb has a single pending slot. Callers of the same verb are
//! serialized by a per-verb lock so a `CALLRET` always resolves the call that
//! sent the matching `CALL`. A call that times out leaves an orphan behind:
//! the next `CALLRET` for that verb belongs to it and is dropped. Closing the
//! channel resolves every slot to `FAILED`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use futures::StreamExt;
use shared::{
    domain::{CallResult, Verb},
    protocol::{validate_field, InboundFrame, Notification, OutboundFrame},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{oneshot, watch, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::SplitStream;
use tracing::{debug, info, warn};

use crate::{error::ChannelError, gate, link::DeviceLink, model::DeviceModel};

pub const REMOTE_FAILURE_MESSAGE: &str = "Automatic execution active. Remote control disabled.";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The controller acknowledged the call with `OK`.
    Completed,
    /// The verb is not legal in the skill's current state; nothing was sent.
    Rejected { state: String },
}

impl SendOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed)
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct PendingCalls {
    slots: HashMap<Verb, oneshot::Sender<CallResult>>,
    /// Timed-out calls per verb whose reply is still owed by the controller.
    orphaned: HashMap<Verb, usize>,
}

pub struct SkillChannel {
    peer: String,
    model: Arc<dyn DeviceModel>,
    writer: Mutex<BoxedWriter>,
    pending: StdMutex<PendingCalls>,
    verb_locks: HashMap<Verb, Mutex<()>>,
    closed: watch::Sender<bool>,
    call_timeout: Duration,
}

impl SkillChannel {
    pub fn new<W>(
        peer: impl Into<String>,
        model: Arc<dyn DeviceModel>,
        writer: W,
        call_timeout: Duration,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            peer: peer.into(),
            model,
            writer: Mutex::new(Box::new(writer)),
            pending: StdMutex::new(PendingCalls::default()),
            verb_locks: Verb::ALL
                .into_iter()
                .map(|verb| (verb, Mutex::new(())))
                .collect(),
            closed,
            call_timeout,
        })
    }

    /// Creates a channel over a controller stream, attaches it to `link`
    /// (closing whatever channel was attached before) and starts its reader.
    pub async fn open<R, W>(
        peer: impl Into<String>,
        link: Arc<DeviceLink>,
        reader: R,
        writer: W,
        call_timeout: Duration,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let channel = Self::new(peer, link.model(), writer, call_timeout);
        if let Some(previous) = link.attach(Arc::clone(&channel)).await {
            info!(
                device = %link.name(),
                previous = %previous.peer(),
                "replacing skill bridge connection"
            );
            previous.close();
        }
        let reader_task = Arc::clone(&channel).spawn_reader(link, reader);
        (channel, reader_task)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Gate-checks `verb` against the skill state, sends the call and waits
    /// for the controller's `CALLRET`.
    pub async fn send_verb(
        &self,
        verb: Verb,
        skill: &str,
        parameter: &str,
    ) -> Result<SendOutcome, ChannelError> {
        validate_field(skill)?;
        validate_field(parameter)?;

        let _serial = self.verb_lock(verb).lock().await;

        let state = self
            .model
            .skill_state(skill)
            .ok_or_else(|| ChannelError::UnknownSkill(skill.to_string()))?;
        if !gate::permits_raw(verb, &state) {
            warn!(%skill, %verb, %state, "skill is in an invalid state for this command");
            return Ok(SendOutcome::Rejected { state });
        }

        let reply = self.register_pending(verb)?;
        let frame = OutboundFrame::Call {
            skill: skill.to_string(),
            verb,
            parameter: parameter.to_string(),
        };
        if let Err(error) = self.write_line(&frame.to_line()).await {
            self.take_pending(verb);
            warn!(%skill, %verb, %error, "failed to write call to skill bridge");
            return Err(ChannelError::Io(error));
        }
        debug!(%skill, %verb, %parameter, "call sent, awaiting reply");

        match tokio::time::timeout(self.call_timeout, reply).await {
            Ok(Ok(CallResult::Ok)) => Ok(SendOutcome::Completed),
            Ok(Ok(CallResult::Failed)) | Ok(Err(_)) => {
                warn!(%skill, %verb, "controller refused call");
                Err(ChannelError::RemoteFailure { verb })
            }
            Err(_) => {
                self.abandon_pending(verb);
                warn!(%skill, %verb, timeout = ?self.call_timeout, "call timed out");
                Err(ChannelError::Timeout {
                    verb,
                    after: self.call_timeout,
                })
            }
        }
    }

    pub async fn send_start(&self, skill: &str, parameter: &str) -> Result<SendOutcome, ChannelError> {
        self.send_verb(Verb::Start, skill, parameter).await
    }

    pub async fn send_stop(&self, skill: &str, parameter: &str) -> Result<SendOutcome, ChannelError> {
        self.send_verb(Verb::Stop, skill, parameter).await
    }

    pub async fn send_suspend(
        &self,
        skill: &str,
        parameter: &str,
    ) -> Result<SendOutcome, ChannelError> {
        self.send_verb(Verb::Suspend, skill, parameter).await
    }

    pub async fn send_resume(
        &self,
        skill: &str,
        parameter: &str,
    ) -> Result<SendOutcome, ChannelError> {
        self.send_verb(Verb::Resume, skill, parameter).await
    }

    pub async fn send_reset(&self, skill: &str, parameter: &str) -> Result<SendOutcome, ChannelError> {
        self.send_verb(Verb::Reset, skill, parameter).await
    }

    /// Marks the channel closed and fails every pending call. Idempotent.
    pub fn close(&self) {
        let drained: Vec<(Verb, oneshot::Sender<CallResult>)> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.send_replace(true);
            pending.orphaned.clear();
            pending.slots.drain().collect()
        };
        for (verb, slot) in drained {
            debug!(peer = %self.peer, %verb, "failing pending call on close");
            let _ = slot.send(CallResult::Failed);
        }
    }

    fn verb_lock(&self, verb: Verb) -> &Mutex<()> {
        // Built for every verb in `new`.
        &self.verb_locks[&verb]
    }

    fn register_pending(&self, verb: Verb) -> Result<oneshot::Receiver<CallResult>, ChannelError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if *self.closed.borrow() {
            return Err(ChannelError::Closed);
        }
        let (slot, reply) = oneshot::channel();
        pending.slots.insert(verb, slot);
        Ok(reply)
    }

    fn take_pending(&self, verb: Verb) -> Option<oneshot::Sender<CallResult>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .remove(&verb)
    }

    /// Gives up on the call in `verb`'s slot. If its reply has not arrived yet
    /// the controller still owes it, so the next reply for `verb` is dropped.
    fn abandon_pending(&self, verb: Verb) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.slots.remove(&verb).is_some() {
            *pending.orphaned.entry(verb).or_default() += 1;
        }
    }

    fn resolve(&self, verb: Verb, result: CallResult) {
        let (orphan, slot) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let owed = pending.orphaned.get(&verb).copied().unwrap_or(0);
            if owed > 0 {
                pending.orphaned.insert(verb, owed - 1);
                (true, None)
            } else {
                (false, pending.slots.remove(&verb))
            }
        };
        if orphan {
            warn!(peer = %self.peer, %verb, %result, "dropping reply to a timed-out call");
            return;
        }
        match slot {
            Some(slot) => {
                if slot.send(result).is_err() {
                    debug!(%verb, "caller stopped waiting before the reply arrived");
                }
            }
            None => warn!(peer = %self.peer, %verb, %result, "call return without a pending call"),
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    fn spawn_reader<R>(self: Arc<Self>, link: Arc<DeviceLink>, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut closed = self.closed.subscribe();
        tokio::spawn(async move {
            let mut lines = SplitStream::new(BufReader::new(reader).split(b'\n'));
            info!(device = %link.name(), peer = %self.peer, "skill bridge started");
            loop {
                if *closed.borrow() {
                    debug!(peer = %self.peer, "skill bridge reader stopping after close");
                    break;
                }
                tokio::select! {
                    line = lines.next() => match line {
                        Some(Ok(bytes)) => {
                            let line = String::from_utf8_lossy(&bytes);
                            self.handle_line(&link, &line).await;
                        }
                        Some(Err(error)) => {
                            warn!(peer = %self.peer, %error, "skill bridge read failed");
                            break;
                        }
                        None => {
                            info!(peer = %self.peer, "skill bridge connection closed by controller");
                            break;
                        }
                    },
                    changed = closed.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            self.close();
            link.detach(&self).await;
        })
    }

    async fn handle_line(&self, link: &DeviceLink, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let frame = match InboundFrame::parse(line) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(peer = %self.peer, %error, "dropping malformed skill bridge frame");
                return;
            }
        };

        match frame {
            InboundFrame::Init { skill } => {
                debug!(%skill, "controller initialized skill");
                let reply = OutboundFrame::Ret {
                    skill,
                    result: CallResult::Ok,
                };
                if let Err(error) = self.write_line(&reply.to_line()).await {
                    warn!(peer = %self.peer, %error, "failed to acknowledge INIT");
                }
            }
            InboundFrame::Update { skill, state, info } => {
                if !self.model.set_skill_state(&skill, &state) {
                    warn!(%skill, %state, "state update for a skill the device does not expose");
                }
                debug!(%skill, %state, %info, "skill state updated");
                link.emit(Notification::StateChange { skill, state });
            }
            InboundFrame::CallReturn {
                skill,
                verb,
                result,
            } => {
                link.emit(Notification::CallReturn {
                    skill,
                    verb,
                    result,
                });
                self.resolve(verb, result);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
