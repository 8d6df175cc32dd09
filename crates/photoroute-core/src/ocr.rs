//! Text recognition through an external Tesseract process.
//!
//! The grayscale photo is encoded as PNG and piped to the tool on stdin;
//! each non-empty output line is one recognised fragment.

use image::{GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Sparse-text page segmentation: find as much text as possible, in no particular order.
const TESSERACT_PSM: &str = "11";

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("encoding image for OCR: {0}")]
    Encode(#[from] image::ImageError),
    #[error("OCR pipe: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `<command> stdin stdout -l <lang> --psm 11` per image.
#[derive(Debug, Clone)]
pub struct TesseractReader {
    command: String,
    lang: String,
}

impl TesseractReader {
    pub fn new(command: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }

    /// Recognise text fragments in a grayscale image.
    pub fn read(&self, image: &GrayImage) -> Result<Vec<String>, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.lang, "--psm", TESSERACT_PSM])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OcrError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(split_fragments(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn split_fragments(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
