//! ONNX Runtime sequence-classification pipeline.
//!
//! Expects a DistilBERT-style SST-2 fine-tune exported to ONNX. The model
//! directory must contain `model.onnx` and `tokenizer.json`; `config.json`
//! is optional and supplies the `id2label` mapping.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::{HeadLabels, ModelError, Prediction, SentimentModel};

/// Longest token sequence DistilBERT accepts.
const MAX_LENGTH: usize = 512;

/// Local sentiment classifier backed by ONNX Runtime.
///
/// Cheap to clone; clones share the loaded session.
#[derive(Clone)]
pub struct OnnxClassifier {
    model_id: String,
    inner: Arc<Inner>,
}

struct Inner {
    // `Session::run` needs `&mut`.
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: HeadLabels,
    wants_type_ids: bool,
}

impl OnnxClassifier {
    /// Load a classifier from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path, model_id: impl Into<String>) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let config_path = model_dir.join("config.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let wants_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let labels = if config_path.exists() {
            HeadLabels::from_config_file(&config_path)?
        } else {
            HeadLabels::default()
        };

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        // Single-text inference; padding would only add masked tokens.
        tokenizer.with_padding(None);

        let model_id = model_id.into();
        info!(
            model = %model_id,
            path = %model_path.display(),
            classes = labels.len(),
            "loaded sentiment model"
        );
        Ok(Self {
            model_id,
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                tokenizer,
                labels,
                wants_type_ids,
            }),
        })
    }

    /// Classify synchronously on the calling thread.
    pub fn classify_blocking(&self, text: &str) -> Result<Prediction, ModelError> {
        self.inner.classify(text)
    }
}

impl Inner {
    fn classify(&self, text: &str) -> Result<Prediction, ModelError> {
        let logits = self
            .logits(text)
            .map_err(|e| ModelError::Inference(format!("{e:#}")))?;
        self.labels.predict(&logits)
    }

    fn logits(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let seq_len = encoding.get_ids().len();
        let to_i64 = |xs: &[u32]| -> Box<[i64]> { xs.iter().map(|&x| i64::from(x)).collect() };
        let shape = [1i64, seq_len as i64];

        let ids_tensor = Tensor::from_array((shape, to_i64(encoding.get_ids())))?;
        let mask_tensor = Tensor::from_array((shape, to_i64(encoding.get_attention_mask())))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("onnx session lock poisoned"))?;

        let outputs = if self.wants_type_ids {
            let type_tensor = Tensor::from_array((shape, to_i64(encoding.get_type_ids())))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])?
        };

        // Logits: [1, num_labels].
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 2 && dims[0] == 1,
            "unexpected output shape: {dims:?}, expected [1, num_labels]"
        );
        debug!(tokens = seq_len, ?dims, "classified");
        Ok(output_data.to_vec())
    }
}

#[async_trait]
impl SentimentModel for OnnxClassifier {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn classify(&self, text: &str) -> Result<Prediction, ModelError> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || inner.classify(&text))
            .await
            .map_err(|e| ModelError::Inference(format!("inference task failed: {e}")))?
    }
}
