//! Scripted broker session for exercising the loop without a broker.

use crate::config::QoS;
use crate::error::MqttError;
use crate::session::{BrokerSession, SessionEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted poll result.
#[derive(Debug, Clone)]
pub enum Step {
    Event(SessionEvent),
    /// Poll fails with a recoverable connection error
    Error(String),
}

impl Step {
    pub fn connack() -> Self {
        Step::Event(SessionEvent::ConnAck {
            session_present: false,
        })
    }

    pub fn publish(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Step::Event(SessionEvent::Publish {
            topic: topic.into(),
            payload: payload.into(),
        })
    }

    pub fn connect_error(reason: impl Into<String>) -> Self {
        Step::Error(reason.into())
    }
}

#[derive(Debug, Default)]
struct Record {
    polls: usize,
    subscriptions: Vec<(String, QoS)>,
    subscribe_rounds: usize,
    round_open: bool,
    refused: Vec<String>,
    disconnected: bool,
}

/// Observer for a [`ScriptedSession`] that has been moved into a manager.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    record: Arc<Mutex<Record>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    /// Every subscribe request accepted so far, in order.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.lock().subscriptions.clone()
    }

    /// Number of CONNACKs followed by at least one subscribe.
    pub fn subscribe_rounds(&self) -> usize {
        self.lock().subscribe_rounds
    }

    pub fn disconnected(&self) -> bool {
        self.lock().disconnected
    }

    pub fn refuse_topic(&self, topic: impl Into<String>) {
        self.lock().refused.push(topic.into());
    }
}

/// Replays a fixed list of poll results, then stays silent forever.
pub struct ScriptedSession {
    steps: VecDeque<Step>,
    handle: ScriptHandle,
}

impl ScriptedSession {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            handle: ScriptHandle {
                record: Arc::new(Mutex::new(Record::default())),
            },
        }
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }

    pub fn polls(&self) -> usize {
        self.handle.polls()
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.handle.subscriptions()
    }

    pub fn subscribe_rounds(&self) -> usize {
        self.handle.subscribe_rounds()
    }

    pub fn disconnected(&self) -> bool {
        self.handle.disconnected()
    }

    pub fn refuse_topic(&self, topic: impl Into<String>) {
        self.handle.refuse_topic(topic)
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn poll(&mut self) -> Result<SessionEvent, MqttError> {
        let step = {
            let mut record = self.handle.lock();
            record.polls += 1;
            let step = self.steps.pop_front();
            if matches!(step, Some(Step::Event(SessionEvent::ConnAck { .. }))) {
                record.round_open = true;
            }
            step
        };

        match step {
            Some(Step::Event(event)) => Ok(event),
            Some(Step::Error(reason)) => Err(MqttError::Connection(reason)),
            None => std::future::pending().await,
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        let mut record = self.handle.lock();
        if record.round_open {
            record.round_open = false;
            record.subscribe_rounds += 1;
        }
        if record.refused.iter().any(|t| t == topic) {
            return Err(MqttError::subscribe(topic, "not authorized"));
        }
        record.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.handle.lock().disconnected = true;
        Ok(())
    }
}
