//! Mapping raw classifier output onto the two sentiment labels.
//!
//! A sequence-classification head emits one logit per class. The class names
//! come from the model's `config.json` (`id2label`); SST-2 fine-tunes use
//! index 0 = NEGATIVE, index 1 = POSITIVE, which is also the fallback.

use std::collections::BTreeMap;
use std::path::Path;

use reviewsense_core::SentimentLabel;
use serde::Deserialize;

use crate::ModelError;

/// A validated prediction: one of the two labels with confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl Prediction {
    /// Validate a provider's raw `(label, score)` pair.
    ///
    /// Any label outside the two-valued enumeration, or a score that is not a
    /// finite probability, is a contract violation.
    pub fn from_raw(label: &str, score: f64) -> Result<Self, ModelError> {
        let label = label
            .parse::<SentimentLabel>()
            .map_err(|e| ModelError::UnexpectedLabel(e.0))?;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ModelError::InvalidScore(score));
        }
        Ok(Self {
            label,
            confidence: score,
        })
    }
}

/// Class names of a classification head, by output index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadLabels {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct ModelConfig {
    #[serde(default)]
    id2label: BTreeMap<String, String>,
}

impl Default for HeadLabels {
    fn default() -> Self {
        Self {
            names: vec!["NEGATIVE".into(), "POSITIVE".into()],
        }
    }
}

impl HeadLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Read `id2label` from a Hugging Face `config.json`.
    ///
    /// Falls back to the SST-2 ordering when the file has no mapping.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ModelConfig = serde_json::from_str(&text)?;
        if config.id2label.is_empty() {
            return Ok(Self::default());
        }

        let mut indexed = Vec::with_capacity(config.id2label.len());
        for (idx, name) in config.id2label {
            let idx: usize = idx
                .parse()
                .map_err(|_| anyhow::anyhow!("non-numeric id2label key {idx:?}"))?;
            indexed.push((idx, name));
        }
        indexed.sort_by_key(|(idx, _)| *idx);
        anyhow::ensure!(
            indexed.iter().enumerate().all(|(pos, (idx, _))| pos == *idx),
            "id2label indices are not contiguous from 0"
        );

        Ok(Self {
            names: indexed.into_iter().map(|(_, name)| name).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Softmax the logits, take the arg-max class, and validate its name.
    pub fn predict(&self, logits: &[f32]) -> Result<Prediction, ModelError> {
        if logits.len() != self.names.len() {
            return Err(ModelError::Inference(format!(
                "expected {} logits, got {}",
                self.names.len(),
                logits.len()
            )));
        }
        let probs = softmax(logits);
        let (best, score) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| ModelError::Inference("empty logits".into()))?;
        Prediction::from_raw(&self.names[best], f64::from(score))
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
