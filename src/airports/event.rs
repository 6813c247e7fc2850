use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::ObjectRef;

/// A background-function event: the payload plus metadata about the trigger.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackgroundEvent {
    pub data: StorageEvent,
    pub context: EventContext,
}

/// An object finalized in a storage bucket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
    pub metageneration: String,
    pub time_created: DateTime<Utc>,
}

impl StorageEvent {
    /// The object the event is about.
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(&self.bucket, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Either a resource name or a structured resource, depending on the trigger.
    #[serde(default)]
    pub resource: Option<serde_json::Value>,
}
