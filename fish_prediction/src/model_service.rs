use ndarray::ArrayView4;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("failed to build tensor: {0}")]
    Input(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("failed to extract tensor: {0}")]
    Output(String),
}

/// A loaded classifier: one batched `(1, 224, 224, 3)` tensor in, one score
/// per class out, in class-catalog order.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError>;
}
