//! Shared utilities for extraction backends.
//!
//! Provides common functionality for:
//! - Downloading and locating OCR models
//! - Checking for CLI tool availability

// Model helpers are only exercised when the ocr-ocrs feature is enabled.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use super::ExtractionError;

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Model file specification for downloading.
pub struct ModelSpec {
    /// URL to download from.
    pub url: &'static str,
    /// Filename to save as.
    pub filename: &'static str,
    /// Human-readable size for progress messages.
    pub size_hint: &'static str,
}

/// Configuration for model directory management.
pub struct ModelDirConfig {
    /// Subdirectory name under the data dir (e.g., "ocrs").
    pub subdir: &'static str,
    /// Required model files to check for presence.
    pub required_files: &'static [&'static str],
}

impl ModelDirConfig {
    /// Get the default model directory for this backend.
    pub fn default_dir(&self) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("datafog")
            .join(self.subdir)
    }

    /// Get standard candidate directories to search for models.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        [
            dirs::data_dir().map(|d| d.join("datafog").join(self.subdir)),
            dirs::home_dir().map(|d| d.join(".datafog").join(self.subdir)),
            Some(PathBuf::from(format!("/usr/share/datafog/{}", self.subdir))),
            Some(PathBuf::from(format!("./models/{}", self.subdir))),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Check if a directory contains all required model files.
    pub fn has_required_files(&self, dir: &Path) -> bool {
        self.required_files
            .iter()
            .all(|file| dir.join(file).exists())
    }
}

/// Download a file from a URL to a local path using curl or wget.
pub fn download_file(url: &str, dest: &Path) -> Result<(), ExtractionError> {
    let output = Command::new("curl")
        .args(["-fSL", "--progress-bar", "-o"])
        .arg(dest)
        .arg(url)
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => {
            let _ = std::fs::remove_file(dest);
            Err(ExtractionError::ExtractionFailed(format!(
                "Failed to download {}",
                url
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Try wget as fallback
            let output = Command::new("wget")
                .args(["-q", "--show-progress", "-O"])
                .arg(dest)
                .arg(url)
                .status();

            match output {
                Ok(status) if status.success() => Ok(()),
                Ok(_) => {
                    let _ = std::fs::remove_file(dest);
                    Err(ExtractionError::ExtractionFailed(format!(
                        "Failed to download {}",
                        url
                    )))
                }
                Err(_) => Err(ExtractionError::BackendNotAvailable(
                    "Neither curl nor wget found. Install one to download models.".to_string(),
                )),
            }
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Download a model file if it doesn't exist, with progress message.
pub fn ensure_model_file(spec: &ModelSpec, model_dir: &Path) -> Result<(), ExtractionError> {
    let dest = model_dir.join(spec.filename);
    if !dest.exists() {
        eprintln!("Downloading {} (~{})...", spec.filename, spec.size_hint);
        download_file(spec.url, &dest)?;
        eprintln!("  ✓ Downloaded {}", spec.filename);
    }
    Ok(())
}
