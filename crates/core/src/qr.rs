use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::{render::svg, EcLevel, QrCode};
use thiserror::Error;

use crate::errors::{Classify, ErrorKind};

const MIN_DIMENSION: u32 = 256;

#[derive(Debug, Error)]
#[error("qr code could not be rendered: {0}")]
pub struct QrRenderError(String);

impl Classify for QrRenderError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Renders pairing text as an SVG image wrapped in a `data:` URI.
pub fn render_data_uri(payload: &str) -> Result<String, QrRenderError> {
    if payload.trim().is_empty() {
        return Err(QrRenderError("empty payload".to_string()));
    }

    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
        .map_err(|error| QrRenderError(error.to_string()))?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .quiet_zone(true)
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image.as_bytes())))
}
