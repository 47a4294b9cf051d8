use crate::routes::{admin, health, webhook};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "wahook-server",
    description = "WhatsApp webhook ingestion, status reconciliation and tenant management",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(webhook::WebhookApi::openapi());
    root.merge(admin::api_docs());
    root
}
