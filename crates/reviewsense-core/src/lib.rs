pub mod clock;
pub mod incoming;
pub mod review;

pub use clock::MonotonicClock;
pub use incoming::{IncomingReview, ProcessingStatus};
pub use review::{
    LabelError, MODEL_VERSION, RecordId, ReviewSubmission, SentimentLabel, SentimentResult,
    SentimentStats, StoredResult,
};
