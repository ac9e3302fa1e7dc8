use crate::{
    config::Config,
    image_decoder::TARGET_SIZE,
    inference_service::InferenceService,
    labels::LabelCatalog,
    model_service::ModelService,
    ort_service::OrtModelService,
    preprocessor::CHANNELS,
    server::HttpServer,
};
use ndarray::Array4;
use thiserror::Error;
use tokio::{signal, sync::broadcast};

/// Conditions that keep the service from accepting traffic at all.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("{0}")]
    Labels(String),
    #[error("Failed to load the model: {0}")]
    ModelLoad(#[from] ort::Error),
    #[error("Model warm-up failed: {0}")]
    Warmup(String),
    #[error("HTTP server error: {0}")]
    Server(#[from] anyhow::Error),
}

/// Runs an all-zero batch through the model and checks that it scores every
/// class of the catalog, so that output index `i` can be read as class `i`.
pub fn warm_up<M: ModelService>(model: &M, catalog: &LabelCatalog) -> Result<(), StartupError> {
    let side = TARGET_SIZE as usize;
    let input = Array4::<f32>::zeros((1, side, side, CHANNELS));

    let scores = model
        .predict(input.view())
        .map_err(|e| StartupError::Warmup(e.to_string()))?;

    if scores.len() != catalog.len() {
        return Err(StartupError::Warmup(format!(
            "model scores {} classes but the label catalog has {}",
            scores.len(),
            catalog.len()
        )));
    }

    Ok(())
}

pub async fn start_app(config: Config) -> Result<(), StartupError> {
    let catalog = LabelCatalog::from_config(&config.labels).map_err(|e| {
        tracing::error!("Failed to initialize label catalog: {}", e);
        StartupError::Labels(e)
    })?;
    tracing::info!("Loaded {} class labels", catalog.len());
    tracing::debug!("Class labels: {:?}", catalog.get_labels());

    let ort_model_service = OrtModelService::new(&config.model).inspect_err(|e| {
        tracing::error!("Failed to load model: {:?}", e);
    })?;

    if config.model.warmup {
        warm_up(&ort_model_service, &catalog).inspect_err(|e| {
            tracing::error!("{}", e);
        })?;
        tracing::info!("Model warm-up succeeded");
    }

    let inference_service = InferenceService::new(ort_model_service, catalog);
    let server = HttpServer::new(inference_service, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Server task failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
