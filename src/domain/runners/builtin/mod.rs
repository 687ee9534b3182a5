pub mod scoring;
pub mod superres;

use crate::domain::runners::registry::{RegistryError, RunnerRegistryBuilder};
use crate::domain::runners::runner::StageError;
use serde_json::Value;

pub const SUPERRES_X4: &str = "superres-x4";
pub const IMAGE_SCORING_V1: &str = "image-scoring-v1";

/// Largest raster side accepted by the built-in runners.
pub const MAX_SIDE: u32 = 1024;

/// Register every built-in runner.
pub fn register_builtin(builder: &mut RunnerRegistryBuilder) -> Result<(), RegistryError> {
    builder
        .register(SUPERRES_X4, |slot| superres::SuperResolutionRunner::new(&slot.slot_id))?
        .register(IMAGE_SCORING_V1, |slot| scoring::ImageScoringRunner::new(&slot.slot_id))?;
    Ok(())
}

/// 8-bit grayscale raster, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl GrayImage {
    /// Decode `{"width", "height", "pixels_hex"}` from a job payload.
    pub fn from_payload(payload: &Value) -> Result<Self, StageError> {
        let side = |name: &str| -> Result<u32, StageError> {
            payload
                .get(name)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| (1..=MAX_SIDE).contains(v))
                .ok_or_else(|| {
                    StageError::bad_input(format!("{name} must be an integer in 1..={MAX_SIDE}"))
                })
        };
        let width = side("width")?;
        let height = side("height")?;

        let encoded = payload
            .get("pixels_hex")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::bad_input("pixels_hex must be provided"))?;
        let pixels = hex::decode(encoded)
            .map_err(|e| StageError::bad_input(format!("pixels_hex is not valid hex: {e}")))?;

        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(StageError::bad_input(format!(
                "expected {expected} pixels for {width}x{height}, got {}",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }
}
