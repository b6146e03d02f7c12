//! Data broker: SQS subscribers and topic subscriptions.

use octofhir_client::{CallError, RestClient};
use octofhir_config::Service;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Collection, Identified, is_false, is_zero};
use crate::lifecycle::OpContext;
use crate::wait::DeleteStatus;

const BASE: &str = "connect/databroker";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsSubscriber {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name_infix: String,
    #[serde(default)]
    pub description: String,
    pub queue_type: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub delivery_delay_seconds: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub message_retention_period: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub receive_wait_time_seconds: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub server_side_encryption: bool,
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default, skip_serializing)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSubscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name_infix: String,
    #[serde(default)]
    pub description: String,
    pub subscriber_id: String,
    #[serde(default)]
    pub deliver_data_only: bool,
    pub topic_name: String,
    #[serde(default, skip_serializing)]
    pub status: String,
}

impl Identified for SqsSubscriber {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for TopicSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone)]
pub struct Dbs {
    rest: RestClient,
}

impl Dbs {
    pub fn new(ctx: &OpContext) -> Self {
        Self {
            rest: ctx.rest(Service::Dbs).with_header("api-version", "1"),
        }
    }

    pub fn subscribers(&self) -> Collection<SqsSubscriber> {
        Collection::new(self.rest.clone(), format!("{BASE}/Subscriber/SQS"))
    }

    pub fn subscriptions(&self) -> Collection<TopicSubscription> {
        Collection::new(self.rest.clone(), format!("{BASE}/Subscription/Topic"))
    }

    /// Progress of an asynchronous subscriber deletion.
    pub async fn subscriber_delete_status(&self, id: &str) -> Result<DeleteStatus, CallError> {
        let path = format!("{BASE}/Subscriber/SQS/{id}/$delete-status");
        let (body, _): (Value, _) = self.rest.get(&path).await?;
        Ok(DeleteStatus::parse(
            body.get("status").and_then(Value::as_str).unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_is_read_only() {
        let sub: SqsSubscriber = serde_json::from_value(json!({
            "id": "s1", "nameInfix": "orders", "queueType": "Standard", "status": "ACTIVE"
        }))
        .unwrap();
        assert_eq!(sub.status, "ACTIVE");
        let json = serde_json::to_value(&sub).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["nameInfix"], "orders");
    }
}
