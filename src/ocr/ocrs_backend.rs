//! OCRS backend implementation.
//!
//! Uses the ocrs crate for pure-Rust OCR without external binaries.
//! Models are automatically downloaded on first use from:
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::model_utils::{ensure_model_file, ModelDirConfig, ModelSpec};
use super::{ExtractionError, TextExtractor};

/// Global cached OcrEngine instance (initialized once, reused for all calls).
/// OcrEngine is Send+Sync and its methods take &self, so no Mutex needed.
static OCR_ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

/// Model directory configuration for OCRS.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "ocrs",
    required_files: &["text-detection.rten", "text-recognition.rten"],
};

/// Model specifications for downloading.
const DETECTION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
    filename: "text-detection.rten",
    size_hint: "2.5 MB",
};

const RECOGNITION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
    filename: "text-recognition.rten",
    size_hint: "10 MB",
};

/// Pure-Rust OCRS text extractor.
pub struct OcrsExtractor {
    model_path: Option<PathBuf>,
}

impl OcrsExtractor {
    /// Create a new OCRS extractor using standard model locations.
    pub fn new() -> Self {
        Self { model_path: None }
    }

    /// Create a new OCRS extractor with an explicit model directory.
    pub fn with_model_path(path: PathBuf) -> Self {
        Self {
            model_path: Some(path),
        }
    }

    /// Find the model directory, checking the explicit path then standard
    /// locations.
    fn find_model_dir(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.model_path {
            if MODEL_CONFIG.has_required_files(path) {
                return Some(path.clone());
            }
        }

        MODEL_CONFIG
            .candidate_dirs()
            .into_iter()
            .find(|dir| MODEL_CONFIG.has_required_files(dir))
    }

    /// Ensure models are present, downloading them if necessary.
    pub fn ensure_models(&self) -> Result<PathBuf, ExtractionError> {
        if let Some(dir) = self.find_model_dir() {
            return Ok(dir);
        }

        let model_dir = MODEL_CONFIG.default_dir();
        std::fs::create_dir_all(&model_dir).map_err(ExtractionError::Io)?;

        ensure_model_file(&DETECTION_MODEL, &model_dir)?;
        ensure_model_file(&RECOGNITION_MODEL, &model_dir)?;

        Ok(model_dir)
    }

    /// Get or initialize the cached OCR engine.
    fn get_or_init_engine(&self) -> Result<&'static ocrs::OcrEngine, ExtractionError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let model_dir = self.ensure_models()?;

        let detection_path = model_dir.join("text-detection.rten");
        let recognition_path = model_dir.join("text-recognition.rten");

        let detection_model = rten::Model::load_file(&detection_path).map_err(|e| {
            ExtractionError::ExtractionFailed(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = rten::Model::load_file(&recognition_path).map_err(|e| {
            ExtractionError::ExtractionFailed(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| {
            ExtractionError::ExtractionFailed(format!("Failed to create OCR engine: {}", e))
        })?;

        // Store in global cache - if another thread beat us, that's fine.
        let _ = OCR_ENGINE.set(engine);

        OCR_ENGINE.get().ok_or_else(|| {
            ExtractionError::ExtractionFailed("Failed to cache OCR engine".to_string())
        })
    }

    /// Run OCR on an image file.
    fn run_ocrs(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let engine = self.get_or_init_engine()?;

        let img = image::open(image_path)
            .map_err(|e| ExtractionError::ImageError(format!("Failed to load image: {}", e)))?;
        let rgb_img = img.to_rgb8();

        let (width, height) = rgb_img.dimensions();

        let img_source = ocrs::ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| ExtractionError::ImageError(format!("Failed to convert image: {}", e)))?;

        let input = engine.prepare_input(img_source).map_err(|e| {
            ExtractionError::ExtractionFailed(format!("Failed to prepare input: {}", e))
        })?;

        engine.get_text(&input).map_err(|e| {
            ExtractionError::ExtractionFailed(format!("Failed to extract text: {}", e))
        })
    }
}

impl Default for OcrsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for OcrsExtractor {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn is_available(&self) -> bool {
        // Always available - models will be auto-downloaded on first use.
        true
    }

    fn availability_hint(&self) -> String {
        match self.find_model_dir() {
            Some(path) => format!("OCRS models found at {:?}", path),
            None => format!(
                "OCRS models will be auto-downloaded on first use (~12 MB total) to {:?}",
                MODEL_CONFIG.default_dir()
            ),
        }
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        self.run_ocrs(path)
    }
}
