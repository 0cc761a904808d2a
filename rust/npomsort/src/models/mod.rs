mod bucket;
mod record;
mod summary;

pub use bucket::{
    BucketName,
    Buckets,
};
pub use record::{
    AnalysedRecord,
    PlAnalysis,
    RejectionReason,
    ResonancePeak,
    TransverseMode,
};
pub use summary::BucketSummary;
