use axum::Router;
use axum_embed::{FallbackBehavior, ServeEmbed};
use rust_embed::RustEmbed;

#[derive(RustEmbed, Clone)]
#[folder = "assets/"]
struct ClientAssets;

/// Static client: `index.html` plus the signaling script.
pub fn app_router() -> Router {
    let serve_assets = ServeEmbed::<ClientAssets>::with_parameters(
        Some("index.html".to_string()),
        FallbackBehavior::Ok,
        Some("index.html".to_string()),
    );

    Router::new().fallback_service(serve_assets)
}
