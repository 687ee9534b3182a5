use crate::domain::runners::builtin::GrayImage;
use crate::domain::runners::runner::{Artifact, Runner, RunnerOutput, StageError};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

pub const SCALE: u32 = 4;

/// 4× nearest-neighbour upscaler producing a binary PGM artifact.
pub struct SuperResolutionRunner {
    slot_id: String,
    loaded: bool,
}

impl SuperResolutionRunner {
    pub fn new(slot_id: &str) -> Self {
        Self {
            slot_id: slot_id.to_string(),
            loaded: false,
        }
    }
}

#[async_trait]
impl Runner for SuperResolutionRunner {
    type Prepared = GrayImage;
    type Output = GrayImage;

    async fn load(&mut self) -> Result<(), StageError> {
        info!(runner = "superres-x4", slot = %self.slot_id, "runner_loaded");
        self.loaded = true;
        Ok(())
    }

    async fn prepare(&mut self, payload: &Value) -> Result<GrayImage, StageError> {
        GrayImage::from_payload(payload)
    }

    async fn infer(&mut self, image: GrayImage) -> Result<GrayImage, StageError> {
        if !self.loaded {
            return Err(StageError::retryable("model not loaded"));
        }

        let width = image.width * SCALE;
        let height = image.height * SCALE;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(image.at(x / SCALE, y / SCALE));
            }
        }

        Ok(GrayImage {
            width,
            height,
            pixels,
        })
    }

    async fn postprocess(&mut self, image: GrayImage) -> Result<RunnerOutput, StageError> {
        let mut bytes = format!("P5\n{} {}\n255\n", image.width, image.height).into_bytes();
        bytes.extend_from_slice(&image.pixels);

        Ok(RunnerOutput {
            artifact: Some(Artifact {
                bytes,
                extension: "pgm",
            }),
            metadata: json!({
                "size": [image.width, image.height],
                "format": "PGM",
                "scale_factor": SCALE,
                "original_size": [image.width / SCALE, image.height / SCALE],
            }),
        })
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn given_2x1_raster_when_run_should_produce_8x4_pgm() {
        let mut runner = SuperResolutionRunner::new("gpu-0");
        runner.load().await.unwrap();

        let image = runner
            .prepare(&json!({"width": 2, "height": 1, "pixels_hex": "10f0"}))
            .await
            .unwrap();
        let upscaled = runner.infer(image).await.unwrap();

        assert_eq!((upscaled.width, upscaled.height), (8, 4));
        assert_eq!(&upscaled.pixels[..8], &[0x10, 0x10, 0x10, 0x10, 0xf0, 0xf0, 0xf0, 0xf0]);

        let output = runner.postprocess(upscaled).await.unwrap();
        let artifact = output.artifact.unwrap();
        assert!(artifact.bytes.starts_with(b"P5\n8 4\n255\n"));
        assert_eq!(artifact.bytes.len(), b"P5\n8 4\n255\n".len() + 32);
        assert_eq!(output.metadata["original_size"], json!([2, 1]));
    }

    #[tokio::test]
    async fn given_unloaded_runner_when_infer_should_fail_retryably() {
        let mut runner = SuperResolutionRunner::new("gpu-0");
        let image = GrayImage {
            width: 1,
            height: 1,
            pixels: vec![0],
        };

        let err = runner.infer(image).await.unwrap_err();

        assert!(err.kind.is_retryable());
    }
}
