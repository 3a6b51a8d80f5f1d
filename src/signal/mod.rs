//! Signal generation: indicators, per-timeframe scoring and fusion.

pub mod fusion;
pub mod indicators;
pub mod scorer;

pub use fusion::{fuse, FusedSignal, FusionConfig};
pub use indicators::{IndicatorConfig, IndicatorSet};
pub use scorer::{ScoringConfig, TimeframeScore, TimeframeScorer};
