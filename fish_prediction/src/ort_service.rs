use crate::{
    config::{InputLayout, ModelConfig, Validatable},
    model_service::{ModelError, ModelService},
};
use ndarray::{ArrayView4, CowArray, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Reorders a channels-last batch into the axis order the graph expects,
/// copying only when the result would not be contiguous.
pub fn to_model_layout(
    input: ArrayView4<'_, f32>,
    layout: InputLayout,
) -> CowArray<'_, f32, Ix4> {
    let input = match layout {
        InputLayout::Nhwc => input,
        InputLayout::Nchw => input.permuted_axes([0, 3, 1, 2]),
    };
    if input.is_standard_layout() {
        CowArray::from(input)
    } else {
        CowArray::from(input.as_standard_layout().into_owned())
    }
}

/// ONNX Runtime backed classifier.
///
/// A session is not safe to run from two threads at once, so every session
/// sits behind its own mutex and requests are spread over the pool
/// round-robin. `num_instances` bounds the number of concurrent inferences.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    input_layout: InputLayout,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ort::Error> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
            input_layout: model_config.input_layout,
        })
    }

    fn run_inference(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let input = to_model_layout(input, self.input_layout);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Input(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Run(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Output(e.to_string()))?;

        Ok(scores.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        self.run_inference(input)
    }
}
