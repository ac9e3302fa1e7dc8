mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod image_decoder;
pub mod inference_service;
pub mod interpreter;
pub mod labels;
pub mod model_service;
pub mod ort_service;
pub mod preprocessor;

pub use app::start_app;
