mod health;
mod metrics;
mod ping;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/ping", get(ping::ping))
        .route("/health", get(health::healthcheck::<M>))
        .route("/predict", post(predict::predict_image::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
