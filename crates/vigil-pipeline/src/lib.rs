#![deny(unreachable_patterns)]
//! Per-stream detection controller.
//!
//! One [`StreamPipeline`] per configured channel wires together:
//! - the dispatcher: stamps frames, caches them, fans sampled frames out
//!   to the tile detector pool
//! - the reconstructor: joins tile results, classifies candidates, applies
//!   the continuous-detection filter, and publishes confirmed events
//! - the clip renderer: two concurrent writer tasks per armed detection
//!   window (boxes drawn / original)
//! - bounded frame caches with background half-eviction
//! - a best-effort result sink persisting confirmed frames to disk

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod paths;
pub mod pipeline;
pub mod reconstructor;
pub mod render;
pub mod sink;
pub mod tiles;

pub use cache::SharedCache;
pub use dispatcher::Dispatcher;
pub use error::{PipelineError, PipelineResult};
pub use filter::{ContinuousFilter, FilterDecision, PreDecision};
pub use paths::ChannelWorkspace;
pub use pipeline::{PipelineDeps, StreamPipeline};
pub use reconstructor::{ConstructResult, Reconstructor};
pub use render::{FrameCache, RectCache, RenderContext, StreamRender};
pub use sink::{ResultRecord, ResultSink};
pub use tiles::TileRunner;
