//! Structured pipeline events.
//!
//! Stages never reach for a process-wide logger. They receive an [`EventSink`] and emit
//! [`PipelineEvent`]s into it; the sink decides where events go and stamps the run's
//! correlation id.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineEvent {
    pub event_name: String,
    pub level: EventLevel,
    pub message: String,
    pub context: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(level: EventLevel, event_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            level,
            message: message.into(),
            context: Map::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn info(event_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, event_name, message)
    }

    pub fn warn(event_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, event_name, message)
    }

    pub fn error(event_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, event_name, message)
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

pub trait EventSink: Send + Sync {
    fn correlation_id(&self) -> &str;
    fn emit(&self, event: PipelineEvent);
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Forwards events to `tracing` with `event_name` and `correlation_id` fields.
#[derive(Clone, Debug)]
pub struct TracingEventSink {
    correlation_id: String,
}

impl TracingEventSink {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into() }
    }
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self::new(new_correlation_id())
    }
}

impl EventSink for TracingEventSink {
    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn emit(&self, event: PipelineEvent) {
        let context = Value::Object(event.context);
        match event.level {
            EventLevel::Debug => tracing::debug!(
                event_name = %event.event_name,
                correlation_id = %self.correlation_id,
                context = %context,
                "{}",
                event.message
            ),
            EventLevel::Info => tracing::info!(
                event_name = %event.event_name,
                correlation_id = %self.correlation_id,
                context = %context,
                "{}",
                event.message
            ),
            EventLevel::Warn => tracing::warn!(
                event_name = %event.event_name,
                correlation_id = %self.correlation_id,
                context = %context,
                "{}",
                event.message
            ),
            EventLevel::Error => tracing::error!(
                event_name = %event.event_name,
                correlation_id = %self.correlation_id,
                context = %context,
                "{}",
                event.message
            ),
        }
    }
}

#[derive(Clone)]
pub struct InMemoryEventSink {
    correlation_id: String,
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl InMemoryEventSink {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), events: Arc::default() }
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn find(&self, event_name: &str) -> Option<PipelineEvent> {
        self.events().into_iter().find(|event| event.event_name == event_name)
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new("test-run")
    }
}

impl EventSink for InMemoryEventSink {
    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn emit(&self, event: PipelineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
