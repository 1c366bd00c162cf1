use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

pub fn api_routes(config: &ServerConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(image_routes(config))
        .routes(routes!(handlers::image::health))
}

fn image_routes(config: &ServerConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::image::upload_image))
        .layer(handlers::image::upload_body_limit(config.max_upload_size));

    OpenApiRouter::new()
        .routes(routes!(
            handlers::image::get_image,
            handlers::image::delete_image
        ))
        .routes(routes!(handlers::image::get_image_status))
        .merge(upload)
}
