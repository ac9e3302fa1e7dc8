use crate::{
    image_decoder, interpreter,
    interpreter::ClassificationResult,
    labels::LabelCatalog,
    model_service::ModelService,
    preprocessor,
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

const ALLOWED_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// Failures of a single prediction request. `Display` is the client facing
/// `detail` message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Unsupported file type. Please upload a PNG or JPG image.")]
    UnsupportedMediaType,
    #[error("Invalid image file: {0}")]
    InvalidImage(String),
    #[error("Prediction error: {0}")]
    InferenceFailure(String),
    #[error("Prediction error: {0}")]
    Internal(String),
    #[error("No file uploaded.")]
    MissingFile,
    #[error("Invalid upload: {0}")]
    Multipart(String),
    #[error("File too large.")]
    PayloadTooLarge,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    pub fn has_allowed_extension(&self) -> bool {
        let filename = self.filename.to_lowercase();
        ALLOWED_EXTENSIONS
            .iter()
            .any(|extension| filename.ends_with(extension))
    }
}

/// Runs one upload through validation, decoding, normalization, the model and
/// interpretation. Holds no per-request state.
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
    catalog: Arc<LabelCatalog>,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M, catalog: LabelCatalog) -> Self {
        Self {
            model_service: Arc::new(model_service),
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    #[cfg(test)]
    pub(crate) fn model_service(&self) -> &M {
        &self.model_service
    }

    #[instrument(skip(self, upload), fields(filename = %upload.filename, size = upload.data.len()))]
    pub fn handle(&self, upload: &UploadedFile) -> Result<ClassificationResult, PredictionError> {
        if !upload.has_allowed_extension() {
            tracing::error!(stage = "validate", "Rejected upload with unsupported extension");
            return Err(PredictionError::UnsupportedMediaType);
        }

        let image = image_decoder::decode(&upload.data).map_err(|e| {
            tracing::error!(stage = "decode", error = %e, "Error processing image file");
            PredictionError::InvalidImage(e.to_string())
        })?;

        let tensor = preprocessor::normalize(&image).map_err(|e| {
            tracing::error!(stage = "preprocess", error = %e, "Unexpected pixel grid");
            PredictionError::Internal(e.to_string())
        })?;
        let batch = preprocessor::batch(tensor);

        let scores = self.model_service.predict(batch.view()).map_err(|e| {
            tracing::error!(stage = "inference", error = %e, "Model invocation failed");
            PredictionError::InferenceFailure(e.to_string())
        })?;

        let result = interpreter::interpret(&scores, &self.catalog).map_err(|e| {
            tracing::error!(stage = "interpret", error = %e, "Unusable model output");
            PredictionError::InferenceFailure(e.to_string())
        })?;

        tracing::info!(
            "Predicted class: {}, Confidence: {:.2}, Solution: {}",
            result.label,
            result.confidence,
            result.solution
        );

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model_service::ModelError;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use ndarray::ArrayView4;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed scores and counts how often it was called.
    #[derive(Default)]
    pub struct StubModelService {
        pub scores: Vec<f32>,
        pub fail_with: Option<ModelError>,
        pub calls: AtomicUsize,
    }

    impl StubModelService {
        pub fn returning(scores: Vec<f32>) -> Self {
            Self {
                scores,
                ..Default::default()
            }
        }

        pub fn failing(error: ModelError) -> Self {
            Self {
                fail_with: Some(error),
                ..Default::default()
            }
        }
    }

    impl ModelService for StubModelService {
        fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(input.shape(), &[1, 224, 224, 3]);
            assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
            match &self.fail_with {
                Some(error) => Err(error.clone()),
                None => Ok(self.scores.clone()),
            }
        }
    }

    pub fn healthy_scores() -> Vec<f32> {
        vec![0.01, 0.02, 0.01, 0.02, 0.91, 0.02, 0.01]
    }

    pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut image_data = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut image_data), ImageFormat::Jpeg)
            .unwrap();
        image_data
    }

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut image_data = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut image_data), ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn service(model: StubModelService) -> InferenceService<StubModelService> {
        InferenceService::new(model, LabelCatalog::default())
    }

    #[test]
    fn test_allowed_extensions_are_case_insensitive() {
        for name in ["fish.png", "FISH.PNG", "a.b.Jpg", "x.JPEG"] {
            assert!(UploadedFile::new(name, Vec::<u8>::new()).has_allowed_extension(), "{}", name);
        }
        for name in ["fish.gif", "fish.png.exe", "png", "fish.webp", ""] {
            assert!(!UploadedFile::new(name, Vec::<u8>::new()).has_allowed_extension(), "{}", name);
        }
    }

    #[test]
    fn test_handle_healthy_fish() {
        let inference_service = service(StubModelService::returning(healthy_scores()));
        let upload = UploadedFile::new("healthy.jpg", jpeg_bytes(512, 512));

        let result = inference_service.handle(&upload).unwrap();

        assert_eq!(
            result,
            ClassificationResult {
                label: "Healthy Fish".to_string(),
                confidence: 0.91,
                solution: "No action needed. Fish is healthy.".to_string(),
            }
        );
    }

    #[test]
    fn test_unsupported_extension_never_reaches_model() {
        let inference_service = service(StubModelService::returning(healthy_scores()));
        let upload = UploadedFile::new("fish.gif", png_bytes(64, 64));

        let result = inference_service.handle(&upload);

        assert_eq!(result, Err(PredictionError::UnsupportedMediaType));
        assert_eq!(
            inference_service.model_service().calls.load(Ordering::SeqCst),
            0
        );
    }

    #[test]
    fn test_random_bytes_are_invalid_image() {
        let inference_service = service(StubModelService::returning(healthy_scores()));
        let upload =
            UploadedFile::new("fish.png", vec![0x13u8, 0x37, 0xde, 0xad, 0xbe, 0xef, 0x00]);

        let result = inference_service.handle(&upload);

        match &result {
            Err(PredictionError::InvalidImage(_)) => {}
            other => panic!("expected InvalidImage, got {:?}", other),
        }
        assert!(result
            .unwrap_err()
            .to_string()
            .starts_with("Invalid image file: "));
    }

    #[test]
    fn test_empty_upload_is_invalid_image() {
        let inference_service = service(StubModelService::returning(healthy_scores()));
        let upload = UploadedFile::new("fish.jpeg", Vec::<u8>::new());

        let result = inference_service.handle(&upload);

        assert_eq!(
            result,
            Err(PredictionError::InvalidImage("empty payload".to_string()))
        );
    }

    #[test]
    fn test_model_failure_is_inference_failure() {
        let inference_service = service(StubModelService::failing(ModelError::Run(
            "out of memory".to_string(),
        )));
        let upload = UploadedFile::new("fish.png", png_bytes(300, 200));

        let result = inference_service.handle(&upload);

        assert_eq!(
            result,
            Err(PredictionError::InferenceFailure(
                "inference failed: out of memory".to_string()
            ))
        );
    }

    #[test]
    fn test_nan_scores_are_inference_failure() {
        let mut scores = healthy_scores();
        scores[2] = f32::NAN;
        let inference_service = service(StubModelService::returning(scores));
        let upload = UploadedFile::new("fish.png", png_bytes(224, 224));

        let result = inference_service.handle(&upload);

        assert!(matches!(result, Err(PredictionError::InferenceFailure(_))));
    }

    #[test]
    fn test_infinite_scores_are_inference_failure() {
        let inference_service = service(StubModelService::returning(vec![f32::NEG_INFINITY; 7]));
        let upload = UploadedFile::new("fish.png", png_bytes(224, 224));

        let result = inference_service.handle(&upload);

        assert_eq!(
            result,
            Err(PredictionError::InferenceFailure(
                "model returned a non-finite top score at index 0".to_string()
            ))
        );
    }

    #[test]
    fn test_wrong_score_count_is_inference_failure() {
        let inference_service = service(StubModelService::returning(vec![0.5, 0.5]));
        let upload = UploadedFile::new("fish.png", png_bytes(224, 224));

        let result = inference_service.handle(&upload);

        assert_eq!(
            result,
            Err(PredictionError::InferenceFailure(
                "model returned 2 scores for 7 classes".to_string()
            ))
        );
    }

    #[test]
    fn test_handle_is_idempotent() {
        let inference_service = service(StubModelService::returning(healthy_scores()));
        let upload = UploadedFile::new("fish.jpg", jpeg_bytes(640, 480));

        let first = inference_service.handle(&upload).unwrap();
        let second = inference_service.handle(&upload).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            inference_service.model_service().calls.load(Ordering::SeqCst),
            2
        );
    }
}
