//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract via the command line. This is the traditional,
//! widely-available option and the default extractor.

use std::path::Path;
use std::process::Command;

use super::model_utils::check_binary;
use super::{ExtractionError, TextExtractor};

/// Tesseract text extractor.
pub struct TesseractExtractor {
    language: String,
}

impl TesseractExtractor {
    /// Create a new Tesseract extractor for English.
    pub fn new() -> Self {
        Self::with_language("eng")
    }

    /// Create a new Tesseract extractor for the given language code.
    pub fn with_language(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Run the tesseract binary on an image file.
    fn run_tesseract(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(ExtractionError::ExtractionFailed(format!(
                        "tesseract failed: {}",
                        stderr
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExtractionError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(ExtractionError::Io(e)),
        }
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if check_binary("tesseract") {
            "Tesseract is available".to_string()
        } else {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        self.run_tesseract(path)
    }
}
