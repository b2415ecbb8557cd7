//! Event subscription reconciliation.
//!
//! On every sign-in the account's desired subscriptions (templates bound to
//! the account id) are compared against what the platform reports, and the
//! missing ones are created. Comparison is by subscription type only: an
//! existing subscription of the right type satisfies the requirement even if
//! its version or condition differ.

mod desired;


pub use desired::{default_templates, SubscriptionDescriptor, SubscriptionTemplate};

#[cfg(test)]
pub(crate) use desired::desired_subscriptions;

use crate::error::ReconcileFailure;
use crate::gateway::{ApiRequest, AuthenticatedGateway};
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUBSCRIPTIONS_PATH: &str = "/eventsub/subscriptions";

/// Stop following cursors after this many pages
const MAX_PAGES: usize = 50;

/// One subscription as reported by the platform.
#[derive(Debug, Deserialize)]
struct ExistingSubscription {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionPage {
    #[serde(default)]
    data: Vec<ExistingSubscription>,
    #[serde(default)]
    pagination: Pagination,
}

/// What a successful reconciliation found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Desired types that already existed
    pub existing: Vec<String>,
    /// Desired types created by this run
    pub created: Vec<String>,
}

/// Ensures an account has every desired event subscription.
pub struct SubscriptionReconciler {
    gateway: Arc<AuthenticatedGateway>,
    conduit_id: String,
    templates: Vec<SubscriptionTemplate>,
}

impl SubscriptionReconciler {
    /// Reconciler for the [`default_templates`] set.
    ///
    /// # Arguments
    /// * `gateway` - Authenticated gateway used for listing and creating
    /// * `conduit_id` - Delivery target for created subscriptions
    pub fn new(gateway: Arc<AuthenticatedGateway>, conduit_id: String) -> Self {
        Self {
            gateway,
            conduit_id,
            templates: default_templates(),
        }
    }

    /// Replaces the desired set.
    pub fn with_templates(mut self, templates: Vec<SubscriptionTemplate>) -> Self {
        self.templates = templates;
        self
    }

    /// Creates whichever desired subscriptions are missing for `account_id`.
    ///
    /// Succeeds only if every desired type ends up present. Running it again
    /// with no external change creates nothing.
    pub async fn reconcile(&self, account_id: &str) -> Result<ReconcileReport, ReconcileFailure> {
        let desired: Vec<SubscriptionDescriptor> = self
            .templates
            .iter()
            .map(|t| t.for_account(account_id))
            .collect();

        let existing = match self.list_existing_types(account_id).await {
            Ok(types) => types,
            Err(e) => {
                warn!(account_id = %account_id, error = %format!("{:#}", e), "Failed to list subscriptions");
                return Err(ReconcileFailure {
                    missing: desired.into_iter().map(|d| d.kind).collect(),
                });
            }
        };

        let (present, missing): (Vec<_>, Vec<_>) = desired
            .into_iter()
            .partition(|d| existing.contains(&d.kind));

        debug!(
            account_id = %account_id,
            present = present.len(),
            missing = missing.len(),
            "Subscription diff computed"
        );

        let results = join_all(missing.iter().map(|d| self.create(account_id, d))).await;

        let mut created = Vec::new();
        let mut failed = Vec::new();
        for (descriptor, result) in missing.into_iter().zip(results) {
            match result {
                Ok(()) => created.push(descriptor.kind),
                Err(reason) => {
                    warn!(
                        account_id = %account_id,
                        subscription_type = %descriptor.kind,
                        reason = %format!("{:#}", reason),
                        "Failed to create subscription"
                    );
                    failed.push(descriptor.kind);
                }
            }
        }

        if !failed.is_empty() {
            return Err(ReconcileFailure { missing: failed });
        }

        if !created.is_empty() {
            info!(account_id = %account_id, created = ?created, "Created missing subscriptions");
        }

        Ok(ReconcileReport {
            existing: present.into_iter().map(|d| d.kind).collect(),
            created,
        })
    }

    /// Lists subscription types the platform reports for the account, following pagination.
    async fn list_existing_types(&self, account_id: &str) -> Result<HashSet<String>> {
        let mut types = HashSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = ApiRequest::get(SUBSCRIPTIONS_PATH).query("user_id", account_id);
            if let Some(after) = &cursor {
                request = request.query("after", after.clone());
            }

            let response = self
                .gateway
                .call(account_id, request)
                .await
                .context("Subscription listing request failed")?;

            if !response.is_success() {
                bail!("Subscription listing returned {}", response.status);
            }

            let page: SubscriptionPage = response
                .json()
                .context("Failed to parse subscription listing")?;

            for subscription in page.data {
                debug!(
                    subscription_type = %subscription.kind,
                    status = ?subscription.status,
                    "Existing subscription"
                );
                types.insert(subscription.kind);
            }

            match page.pagination.cursor.filter(|c| !c.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(types),
            }
        }

        warn!(account_id = %account_id, "Subscription listing truncated at page limit");
        Ok(types)
    }

    async fn create(&self, account_id: &str, descriptor: &SubscriptionDescriptor) -> Result<()> {
        let body = json!({
            "type": descriptor.kind,
            "version": descriptor.version,
            "condition": descriptor.condition,
            "transport": {
                "method": "conduit",
                "conduit_id": self.conduit_id,
            },
        });

        let response = self
            .gateway
            .call(account_id, ApiRequest::post(SUBSCRIPTIONS_PATH).json(body))
            .await
            .with_context(|| format!("Failed to create {} subscription", descriptor.kind))?;

        match response.status {
            s if s.is_success() => Ok(()),
            // Created concurrently by someone else: the type is present
            StatusCode::CONFLICT => Ok(()),
            s => bail!("Subscription create returned {}: {}", s, response.body),
        }
    }
}
