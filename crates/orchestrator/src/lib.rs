//! The supervisory control loop.
//!
//! Device notifications and operator commands are parsed into
//! [`ControlMessage`]s and pushed onto one queue. A single task drains the
//! queue, updates the [`ControllerState`] and walks every registered device
//! through the [`TransitionTable`].

pub mod fsm;
pub mod message;
pub mod queue;
pub mod state;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use shared::domain::{DeviceId, Invocation};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

pub use fsm::{InvocationTemplate, TransitionRule, TransitionTable, TransitionTableError};
pub use message::{normalize, validate_operator_command, ControlMessage, OperatorInputError};
pub use queue::{MessageOrigin, OrchestrationQueue, QueueDiscipline, QueuedMessage};
pub use state::{ControllerState, MAX_CONTROL_STATE, NO_RECIPE};

pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Receives invocations requested by transition rules.
///
/// `submit` is called from the control loop and must return without waiting
/// for the invocation to finish.
pub trait InvocationSink: Send + Sync {
    fn submit(&self, device: DeviceId, invocation: Invocation);
}

/// Sink for running without any device transport.
#[derive(Debug, Default)]
pub struct DiscardInvocations;

impl InvocationSink for DiscardInvocations {
    fn submit(&self, device: DeviceId, invocation: Invocation) {
        debug!(%device, invocation = %invocation.browse_name(), "no invocation transport, dropping");
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub discipline: QueueDiscipline,
    pub idle_wait: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            discipline: QueueDiscipline::default(),
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

enum Step {
    Evaluate,
    Skip,
    Stop,
}

pub struct ControlOrchestrator {
    queue: OrchestrationQueue,
    state: Mutex<ControllerState>,
    table: TransitionTable,
    sink: Arc<dyn InvocationSink>,
    shutdown: watch::Sender<bool>,
    idle_wait: Duration,
}

impl ControlOrchestrator {
    pub fn new(
        options: OrchestratorOptions,
        table: TransitionTable,
        sink: Arc<dyn InvocationSink>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            queue: OrchestrationQueue::new(options.discipline),
            state: Mutex::new(ControllerState::default()),
            table,
            sink,
            shutdown,
            idle_wait: options.idle_wait,
        })
    }

    /// Adds a device at sub-state 1. Known devices keep their sub-state.
    pub fn register_device(&self, device: DeviceId) {
        if self.lock_state().register_device(device) {
            info!(%device, "device registered");
        }
    }

    /// Queues a notification delivered by `device`.
    pub fn pass_event(&self, device: DeviceId, text: &str) {
        let message = ControlMessage::parse(text);
        debug!(%device, ?message, "event received");
        self.queue.push(QueuedMessage {
            origin: MessageOrigin::Device(device),
            message,
        });
    }

    /// Queues an operator command.
    pub fn user_input(&self, text: &str) {
        let message = ControlMessage::parse(text);
        debug!(?message, "operator input received");
        self.queue.push(QueuedMessage {
            origin: MessageOrigin::Operator,
            message,
        });
    }

    /// Stops the loop at its next iteration, whatever is still queued.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn snapshot(&self) -> ControllerState {
        self.lock_state().clone()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        info!(discipline = %self.queue.discipline(), rules = self.table.rules().len(), "control loop started");
        loop {
            if *shutdown.borrow_and_update() {
                info!("shutdown requested");
                break;
            }
            match self.queue.pop() {
                Some(item) => match self.interpret(item) {
                    Step::Stop => break,
                    Step::Skip => continue,
                    Step::Evaluate => self.evaluate_devices(),
                },
                None => {
                    self.evaluate_devices();
                    tokio::select! {
                        _ = self.queue.pushed() => {}
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.idle_wait) => {}
                    }
                }
            }
        }
        info!("control loop shut down");
    }

    fn interpret(&self, item: QueuedMessage) -> Step {
        let mut state = self.lock_state();
        match item.message {
            ControlMessage::Shutdown => {
                info!("shutdown command received");
                return Step::Stop;
            }
            ControlMessage::ChangeControlState(target) => {
                if state.change_control_state(target) {
                    info!(state = target, "controller state changed");
                } else {
                    warn!(target, "invalid target state");
                }
            }
            ControlMessage::SkillRecipe(name) => {
                if state.claim_recipe(&name) {
                    info!(recipe = %name, "recipe claimed");
                } else {
                    debug!(recipe = %name, active = %state.current_recipe, "recipe already active");
                }
            }
            ControlMessage::StateChange { skill, state: skill_state } => match item.origin {
                MessageOrigin::Device(device) => state.observe_state(device, &skill, &skill_state),
                MessageOrigin::Operator => debug!(%skill, "ignoring state change typed by operator"),
            },
            ControlMessage::CallReturn {
                skill,
                verb,
                result,
            } => match item.origin {
                MessageOrigin::Device(device) => state.observe_call(device, &skill, verb, result),
                MessageOrigin::Operator => debug!(%skill, "ignoring call return typed by operator"),
            },
            ControlMessage::ServerMessage(text) => info!(origin = ?item.origin, %text, "server message"),
            ControlMessage::Unrecognized(tokens) => {
                debug!(?tokens, "ignoring unrecognized message");
                return Step::Skip;
            }
        }
        Step::Evaluate
    }

    fn evaluate_devices(&self) {
        let requested: Vec<(DeviceId, Invocation)> = {
            let mut state = self.lock_state();
            let devices: Vec<(DeviceId, i64)> = state
                .device_states
                .iter()
                .map(|(device, sub_state)| (*device, *sub_state))
                .collect();
            let mut requested = Vec::new();
            for (device, sub_state) in devices {
                let Some(rule) = self.table.evaluate(&state, device, sub_state) else {
                    continue;
                };
                if rule.next_device_state != sub_state {
                    debug!(%device, from = sub_state, to = rule.next_device_state, "device transition");
                }
                state.device_states.insert(device, rule.next_device_state);
                if let Some(template) = &rule.invoke {
                    requested.push((device, template.to_invocation()));
                }
            }
            requested
        };
        for (device, invocation) in requested {
            info!(%device, invocation = %invocation.browse_name(), "requesting invocation");
            self.sink.submit(device, invocation);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
