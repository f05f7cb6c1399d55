//! Admin audit trail.

use lockshop_core::NewAdminLog;
use lockshop_storage::ShopStore;

use crate::auth::AuthContext;

/// Append an audit entry for an admin mutation.
///
/// The mutation has already happened, so a failed write is logged rather
/// than turned into an error response.
pub async fn record_admin_action(
    store: &dyn ShopStore,
    admin: &AuthContext,
    action: &str,
    target: &str,
    details: Option<String>,
) {
    let mut entry = NewAdminLog::web(admin.growid.clone(), action).with_target(target);
    if let Some(details) = details {
        entry = entry.with_details(details);
    }
    if let Err(e) = store.admin_log_record(&entry).await {
        tracing::error!(
            admin = %admin.growid,
            action = %action,
            target = %target,
            error = %e,
            "Failed to record admin action"
        );
    }
}
