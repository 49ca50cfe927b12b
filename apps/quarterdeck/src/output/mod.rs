pub mod normalize;

pub use normalize::{normalize_chunk, NormalizedLine};
