use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event subscription the system requires for a connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Event type identifier (e.g. `stream.online`)
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    /// Condition keys mapped to the account id
    pub condition: BTreeMap<String, String>,
}

/// Account-independent shape of a desired subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTemplate {
    pub kind: String,
    pub version: String,
    /// Condition keys whose value is the account id
    pub condition_keys: Vec<String>,
}

impl SubscriptionTemplate {
    pub fn new(kind: &str, version: &str, condition_keys: &[&str]) -> Self {
        Self {
            kind: kind.to_string(),
            version: version.to_string(),
            condition_keys: condition_keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Binds the template to one account.
    pub fn for_account(&self, account_id: &str) -> SubscriptionDescriptor {
        SubscriptionDescriptor {
            kind: self.kind.clone(),
            version: self.version.clone(),
            condition: self
                .condition_keys
                .iter()
                .map(|k| (k.clone(), account_id.to_string()))
                .collect(),
        }
    }
}

/// Subscriptions every broadcaster account needs.
pub fn default_templates() -> Vec<SubscriptionTemplate> {
    vec![
        SubscriptionTemplate::new(
            "channel.chat.message",
            "1",
            &["broadcaster_user_id", "user_id"],
        ),
        SubscriptionTemplate::new("channel.update", "2", &["broadcaster_user_id"]),
        SubscriptionTemplate::new(
            "channel.channel_points_custom_reward_redemption.add",
            "1",
            &["broadcaster_user_id"],
        ),
        SubscriptionTemplate::new("stream.online", "1", &["broadcaster_user_id"]),
        SubscriptionTemplate::new("stream.offline", "1", &["broadcaster_user_id"]),
    ]
}

/// The default desired set bound to `account_id`.
#[cfg(test)]
pub(crate) fn desired_subscriptions(account_id: &str) -> Vec<SubscriptionDescriptor> {
    default_templates()
        .iter()
        .map(|t| t.for_account(account_id))
        .collect()
}
