use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::openapi::{InfoBuilder, OpenApi};
use utoipa_axum::router::OpenApiRouter;

use crate::{app_state::AppState, routes, swagger};

fn routes_with_openapi() -> OpenApiRouter<AppState> {
    routes::health::routes_with_openapi()
        .merge(routes::orders::routes_with_openapi())
        .merge(routes::customers::orders::routes_with_openapi())
        .merge(routes::shops::orders::routes_with_openapi())
        .merge(routes::admin::routes_with_openapi())
}

pub fn openapi() -> OpenApi {
    let (_, mut openapi) = routes_with_openapi().split_for_parts();
    openapi.info = InfoBuilder::new()
        .title("PrintShop OrderService API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    openapi
}

/// Full HTTP application: API routes, Swagger UI and request tracing.
pub fn build_router(state: AppState) -> Router {
    let (routes, _) = routes_with_openapi().split_for_parts();
    let swagger_ui = swagger::create_swagger_ui(openapi());

    Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
