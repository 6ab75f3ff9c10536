//! Model providers: ONNX Runtime sequence classification and remote inference endpoints.

use async_trait::async_trait;

mod error;
mod labels;

pub use error::ModelError;
pub use labels::{HeadLabels, Prediction, softmax};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

#[cfg(feature = "remote")]
mod remote;
#[cfg(feature = "remote")]
pub use remote::RemoteClassifier;

/// Pretrained SST-2 fine-tune used unless configured otherwise.
pub const DEFAULT_MODEL_ID: &str = "distilbert-base-uncased-finetuned-sst-2-english";

/// A loaded sentiment classifier.
///
/// Implementations are constructed once at start-up and shared read-only
/// across request handlers.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    /// Identifier of the underlying pretrained model.
    fn model_id(&self) -> &str;

    /// Classify one text. Called exactly once per request; never retried here.
    async fn classify(&self, text: &str) -> Result<Prediction, ModelError>;
}
