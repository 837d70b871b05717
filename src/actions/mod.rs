//! Overlay and refund actuators.
//!
//! The scheduler drives two external collaborators:
//!
//! * [`OverlayActuator`]: `show(text)` / `hide()` for the on-stream overlay.
//! * [`RefundActuator`]: returns a viewer's channel-point redemption.
//!
//! [`ActionDispatcher`] implements both by formatting `DoAction` requests
//! for a streaming-automation action server and publishing them on a
//! channel.  Whatever transport owns the receiving end forwards them.  A
//! missing action id makes the call a silent no-op.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::ActionConfig;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OverlayActuator: Send + Sync {
    async fn show(&self, text: &str);
    async fn hide(&self);
}

/// Correlation data needed to refund a redemption.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefundRequest {
    pub redemption_id: Option<String>,
    pub reward_id: Option<String>,
    pub username: Option<String>,
    pub reason: String,
}

#[async_trait]
pub trait RefundActuator: Send + Sync {
    /// `false` when the refund could not be sent, including when either
    /// correlation id is missing.
    async fn refund(&self, request: &RefundRequest) -> bool;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRef {
    pub id: String,
}

/// A `DoAction` request for the action server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoAction {
    pub request: &'static str,
    pub id: String,
    pub action: ActionRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ActionDispatcher
// ---------------------------------------------------------------------------

pub struct ActionDispatcher {
    config: ActionConfig,
    tx: mpsc::UnboundedSender<DoAction>,
    counter: AtomicU64,
}

impl ActionDispatcher {
    pub fn new(config: ActionConfig, tx: mpsc::UnboundedSender<DoAction>) -> Self {
        Self {
            config,
            tx,
            counter: AtomicU64::new(0),
        }
    }

    fn action_id(configured: &Option<String>) -> Option<&str> {
        configured.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    fn publish(&self, kind: &str, action_id: &str, args: Option<serde_json::Value>) -> bool {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let message = DoAction {
            request: "DoAction",
            id: format!("{kind}-{n}"),
            action: ActionRef {
                id: action_id.to_string(),
            },
            args,
        };
        match self.tx.send(message) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("actions: no action server attached, dropped {kind}");
                false
            }
        }
    }
}

#[async_trait]
impl OverlayActuator for ActionDispatcher {
    async fn show(&self, text: &str) {
        let Some(id) = Self::action_id(&self.config.show_action_id) else {
            log::debug!("actions: no show action configured");
            return;
        };
        if self.publish("show", id, Some(serde_json::json!({ "rawInput": text }))) {
            log::debug!("actions: show sent");
        }
    }

    async fn hide(&self) {
        let Some(id) = Self::action_id(&self.config.hide_action_id) else {
            log::debug!("actions: no hide action configured");
            return;
        };
        if self.publish("hide", id, None) {
            log::debug!("actions: hide sent");
        }
    }
}

#[async_trait]
impl RefundActuator for ActionDispatcher {
    async fn refund(&self, request: &RefundRequest) -> bool {
        let Some(id) = Self::action_id(&self.config.refund_action_id) else {
            return false;
        };
        let (Some(redemption_id), Some(reward_id)) = (&request.redemption_id, &request.reward_id)
        else {
            log::info!("actions: cannot refund, request has no redemption/reward id");
            return false;
        };

        let args = serde_json::json!({
            "redemptionId": redemption_id,
            "rewardId": reward_id,
            "username": request.username.clone().unwrap_or_default(),
            "reason": request.reason,
        });
        let sent = self.publish("refund", id, Some(args));
        if sent {
            log::info!(
                "actions: refund sent for '{}': {}",
                request.username.as_deref().unwrap_or(""),
                request.reason
            );
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ActionConfig {
        ActionConfig {
            show_action_id: Some("show-action".into()),
            hide_action_id: Some("hide-action".into()),
            refund_action_id: Some("refund-action".into()),
        }
    }

    fn refund_request() -> RefundRequest {
        RefundRequest {
            redemption_id: Some("red-1".into()),
            reward_id: Some("rew-1".into()),
            username: Some("viewer".into()),
            reason: "Cancelled by streamer".into(),
        }
    }

    #[tokio::test]
    async fn show_and_hide_publish_numbered_requests() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(configured(), tx);

        dispatcher.show("hello chat").await;
        dispatcher.hide().await;

        let show = rx.recv().await.unwrap();
        assert_eq!(show.id, "show-1");
        assert_eq!(show.action.id, "show-action");
        assert_eq!(show.args.unwrap()["rawInput"], "hello chat");

        let hide = rx.recv().await.unwrap();
        assert_eq!(hide.id, "hide-2");
        assert!(hide.args.is_none());

        let json = serde_json::to_value(&hide).unwrap();
        assert_eq!(json["request"], "DoAction");
        assert!(json.get("args").is_none());
    }

    #[tokio::test]
    async fn unconfigured_actions_are_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(ActionConfig::default(), tx);

        dispatcher.show("hello").await;
        dispatcher.hide().await;
        assert!(!dispatcher.refund(&refund_request()).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn refund_carries_correlation_ids() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(configured(), tx);

        assert!(dispatcher.refund(&refund_request()).await);
        let msg = rx.recv().await.unwrap();
        let args = msg.args.unwrap();
        assert_eq!(args["redemptionId"], "red-1");
        assert_eq!(args["rewardId"], "rew-1");
        assert_eq!(args["username"], "viewer");
        assert_eq!(args["reason"], "Cancelled by streamer");
    }

    #[tokio::test]
    async fn refund_without_ids_returns_false() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(configured(), tx);

        let request = RefundRequest {
            reward_id: None,
            ..refund_request()
        };
        assert!(!dispatcher.refund(&request).await);
        assert!(rx.try_recv().is_err());
    }
}
