//! Keys of the session context shared by the collector, the orchestrator and
//! the workflow tasks.

use medscan_flow::Context;

use crate::models::Notification;

pub const IMAGE: &str = "image";
pub const PREVIEW: &str = "preview";
pub const REFERENCE: &str = "image_reference";
pub const RESULT: &str = "analysis_result";
pub const STAGE: &str = "stage";
pub const SUBMIT_REQUESTED: &str = "submit_requested";
pub const NEW_ANALYSIS_REQUESTED: &str = "new_analysis_requested";
pub const NOTIFICATIONS: &str = "notifications";

/// Undrained notifications kept per session; older ones are dropped first.
pub const MAX_PENDING_NOTIFICATIONS: usize = 16;

/// Queue a notification for `ScanWorkflow::take_notifications`. Callers that
/// never drain the queue lose all but the newest `MAX_PENDING_NOTIFICATIONS`.
pub async fn push_notification(
    context: &Context,
    notification: Notification,
) -> medscan_flow::Result<()> {
    let mut pending: Vec<Notification> = context.get(NOTIFICATIONS).await.unwrap_or_default();
    pending.push(notification);
    let overflow = pending.len().saturating_sub(MAX_PENDING_NOTIFICATIONS);
    pending.drain(..overflow);
    context.set(NOTIFICATIONS, pending).await
}
