use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use shared::domain::DeviceId;
use tokio::sync::Notify;

use crate::message::ControlMessage;

/// Order in which queued messages are taken by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDiscipline {
    /// Most recent message first.
    #[default]
    Lifo,
    Fifo,
}

impl fmt::Display for QueueDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueDiscipline::Lifo => "lifo",
            QueueDiscipline::Fifo => "fifo",
        })
    }
}

impl FromStr for QueueDiscipline {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "lifo" => Ok(QueueDiscipline::Lifo),
            "fifo" => Ok(QueueDiscipline::Fifo),
            other => Err(format!("unknown queue discipline `{other}` (expected lifo or fifo)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Operator,
    Device(DeviceId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub origin: MessageOrigin,
    pub message: ControlMessage,
}

/// Multi-producer queue drained by the single control loop.
#[derive(Debug)]
pub struct OrchestrationQueue {
    discipline: QueueDiscipline,
    items: Mutex<VecDeque<QueuedMessage>>,
    pushed: Notify,
}

impl OrchestrationQueue {
    pub fn new(discipline: QueueDiscipline) -> Self {
        Self {
            discipline,
            items: Mutex::new(VecDeque::new()),
            pushed: Notify::new(),
        }
    }

    pub fn discipline(&self) -> QueueDiscipline {
        self.discipline
    }

    pub fn push(&self, item: QueuedMessage) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self.pushed.notify_one();
    }

    pub fn pop(&self) -> Option<QueuedMessage> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match self.discipline {
            QueueDiscipline::Lifo => items.pop_back(),
            QueueDiscipline::Fifo => items.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after the next push, or immediately if a push happened since
    /// the last wait.
    pub async fn pushed(&self) {
        self.pushed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator(message: ControlMessage) -> QueuedMessage {
        QueuedMessage {
            origin: MessageOrigin::Operator,
            message,
        }
    }

    fn drain(queue: &OrchestrationQueue) -> Vec<ControlMessage> {
        std::iter::from_fn(|| queue.pop().map(|item| item.message)).collect()
    }

    #[test]
    fn lifo_pops_newest_first() {
        let queue = OrchestrationQueue::new(QueueDiscipline::Lifo);
        for n in 1..=3 {
            queue.push(operator(ControlMessage::ChangeControlState(n)));
        }
        assert_eq!(
            drain(&queue),
            vec![
                ControlMessage::ChangeControlState(3),
                ControlMessage::ChangeControlState(2),
                ControlMessage::ChangeControlState(1),
            ]
        );
    }

    #[test]
    fn fifo_pops_oldest_first() {
        let queue = OrchestrationQueue::new(QueueDiscipline::Fifo);
        for n in 1..=3 {
            queue.push(operator(ControlMessage::ChangeControlState(n)));
        }
        assert_eq!(
            drain(&queue),
            vec![
                ControlMessage::ChangeControlState(1),
                ControlMessage::ChangeControlState(2),
                ControlMessage::ChangeControlState(3),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn discipline_parses_case_insensitively() {
        assert_eq!("FIFO".parse(), Ok(QueueDiscipline::Fifo));
        assert_eq!("lifo".parse(), Ok(QueueDiscipline::Lifo));
        assert!("stack".parse::<QueueDiscipline>().is_err());
        assert_eq!(QueueDiscipline::default(), QueueDiscipline::Lifo);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pushes_are_all_popped_once() {
        use std::{collections::HashSet, sync::Arc};

        let queue = Arc::new(OrchestrationQueue::new(QueueDiscipline::Fifo));
        let producers: Vec<_> = (0..8i64)
            .map(|device| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    for n in 0..500 {
                        queue.push(QueuedMessage {
                            origin: MessageOrigin::Device(DeviceId(device)),
                            message: ControlMessage::ChangeControlState(n),
                        });
                    }
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut finished = false;
        while !finished {
            finished = producers.iter().all(|producer| producer.is_finished());
            while let Some(item) = queue.pop() {
                let MessageOrigin::Device(device) = item.origin else {
                    panic!("unexpected origin {:?}", item.origin);
                };
                let ControlMessage::ChangeControlState(n) = item.message else {
                    panic!("unexpected message {:?}", item.message);
                };
                assert!(seen.insert((device, n)), "popped twice: {device} {n}");
            }
            tokio::task::yield_now().await;
        }
        for producer in producers {
            producer.await.expect("producer");
        }
        assert!(queue.pop().is_none());
        assert_eq!(seen.len(), 8 * 500);
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let queue = OrchestrationQueue::new(QueueDiscipline::Lifo);
        queue.push(operator(ControlMessage::Shutdown));
        tokio::time::timeout(std::time::Duration::from_millis(100), queue.pushed())
            .await
            .expect("stored permit wakes the waiter");
    }
}
