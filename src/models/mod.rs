mod asset;

pub use asset::{AnalysisResult, MediaAsset, MediaKind, MediaPayload};
