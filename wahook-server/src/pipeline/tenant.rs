//! Routing a webhook change to its tenant.

use tracing::{error, warn};

use crate::entities::{TenantRecord, TenantStore};

/// Exact match on the provider phone-number id. A missing id, an unknown id,
/// an inactive tenant and a lookup failure all yield `None`; the caller drops
/// the change after acknowledging it.
pub async fn resolve<S: TenantStore>(
    store: &S,
    phone_number_id: Option<&str>,
) -> Option<TenantRecord> {
    let Some(phone_number_id) = phone_number_id.map(str::trim).filter(|p| !p.is_empty()) else {
        warn!("change has no phone_number_id; dropped");
        return None;
    };

    match store.find_by_phone_number_id(phone_number_id).await {
        Ok(Some(tenant)) if tenant.is_active => Some(tenant),
        Ok(Some(tenant)) => {
            warn!(tenant_id = %tenant.id, phone_number_id, "tenant inactive; change dropped");
            None
        }
        Ok(None) => {
            warn!(phone_number_id, "no tenant for phone_number_id; change dropped");
            None
        }
        Err(e) => {
            error!(phone_number_id, error = %e, "tenant lookup failed; change dropped");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::testing;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn resolves_active_tenant_by_exact_id() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "106540352242922").await;
        let found = resolve(&store, Some("106540352242922")).await.unwrap();
        assert_eq!(found.id, tenant.id);
        assert!(resolve(&store, Some("10654035224292")).await.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_id_never_falls_back_to_another_tenant() {
        let store = testing::store().await;
        testing::tenant(&store, "1111").await;
        assert!(resolve(&store, Some("9999")).await.is_none());
        assert!(resolve(&store, None).await.is_none());
        assert!(logs_contain("no tenant for phone_number_id"));
    }

    #[tokio::test]
    async fn inactive_tenant_is_not_resolved() {
        let store = testing::store().await;
        let tenant = testing::tenant(&store, "1111").await;
        store.set_active(&tenant.id, false).await.unwrap();
        assert!(resolve(&store, Some("1111")).await.is_none());
    }
}
