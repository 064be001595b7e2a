pub mod blobs;
pub mod chain;
pub mod dom;
pub mod extract;
pub mod finders;
pub mod reveal;
pub mod surface;
pub mod tree;

pub use chain::{ChainOutcome, DebugSampler, ExtractionChain};
pub use surface::StaticSurface;
