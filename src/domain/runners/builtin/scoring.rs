use crate::domain::runners::builtin::GrayImage;
use crate::domain::runners::runner::{Runner, RunnerOutput, StageError};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

const LABELS: [&str; 5] = [
    "quality",
    "aesthetics",
    "sharpness",
    "color_balance",
    "composition",
];

/// Scores derived from raster statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub values: [f64; 5],
    pub original_size: (u32, u32),
}

/// Image quality scorer producing five scores in `[0, 1]`.
pub struct ImageScoringRunner {
    slot_id: String,
    loaded: bool,
}

impl ImageScoringRunner {
    pub fn new(slot_id: &str) -> Self {
        Self {
            slot_id: slot_id.to_string(),
            loaded: false,
        }
    }
}

/// Bucket an overall score into a quality label.
pub fn quality_assessment(overall: f64) -> &'static str {
    if overall > 0.8 {
        "excellent"
    } else if overall > 0.6 {
        "good"
    } else if overall > 0.4 {
        "average"
    } else if overall > 0.2 {
        "below_average"
    } else {
        "poor"
    }
}

fn score(image: &GrayImage) -> [f64; 5] {
    let n = image.pixels.len() as f64;
    let normalized: Vec<f64> = image.pixels.iter().map(|&p| f64::from(p) / 255.0).collect();

    let mean = normalized.iter().sum::<f64>() / n;
    let variance = normalized.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;

    // Well exposed images sit near mid-grey.
    let quality = 1.0 - (mean - 0.5).abs() * 2.0;
    let aesthetics = (variance.sqrt() * 2.0).min(1.0);

    let mut gradient = 0.0;
    let mut pairs = 0usize;
    let mut mirror = 0.0;
    for y in 0..image.height {
        for x in 0..image.width {
            if x + 1 < image.width {
                gradient += f64::from(image.at(x, y).abs_diff(image.at(x + 1, y))) / 255.0;
                pairs += 1;
            }
            let opposite = image.at(image.width - 1 - x, y);
            mirror += f64::from(image.at(x, y).abs_diff(opposite)) / 255.0;
        }
    }
    let sharpness = if pairs == 0 {
        0.0
    } else {
        (gradient / pairs as f64 * 4.0).min(1.0)
    };
    let clipped = image.pixels.iter().filter(|&&p| p == 0 || p == 255).count() as f64;
    let color_balance = 1.0 - clipped / n;
    let composition = 1.0 - mirror / n;

    [quality, aesthetics, sharpness, color_balance, composition].map(|s| s.clamp(0.0, 1.0))
}

#[async_trait]
impl Runner for ImageScoringRunner {
    type Prepared = GrayImage;
    type Output = Scores;

    async fn load(&mut self) -> Result<(), StageError> {
        info!(runner = "image-scoring-v1", slot = %self.slot_id, "runner_loaded");
        self.loaded = true;
        Ok(())
    }

    async fn prepare(&mut self, payload: &Value) -> Result<GrayImage, StageError> {
        GrayImage::from_payload(payload)
    }

    async fn infer(&mut self, image: GrayImage) -> Result<Scores, StageError> {
        if !self.loaded {
            return Err(StageError::retryable("model not loaded"));
        }
        Ok(Scores {
            values: score(&image),
            original_size: (image.width, image.height),
        })
    }

    async fn postprocess(&mut self, scores: Scores) -> Result<RunnerOutput, StageError> {
        let overall = scores.values.iter().sum::<f64>() / scores.values.len() as f64;
        let named: serde_json::Map<String, Value> = LABELS
            .iter()
            .zip(scores.values)
            .map(|(label, value)| (label.to_string(), json!(value)))
            .collect();

        Ok(RunnerOutput {
            artifact: None,
            metadata: json!({
                "scores": named,
                "overall_score": overall,
                "quality_assessment": quality_assessment(overall),
                "metadata": {
                    "original_size": [scores.original_size.0, scores.original_size.1],
                    "format": "GRAY8",
                },
            }),
        })
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }
}
