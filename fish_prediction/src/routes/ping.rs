use axum::{response::IntoResponse, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Ping {
    message: &'static str,
}

pub async fn ping() -> impl IntoResponse {
    Json(Ping {
        message: "Hello, I am alive",
    })
}
