mod batch;
mod candidate;
mod container;
mod signature;

pub use batch::{AssemblyBatch, FetchedClip};
pub use candidate::ClipCandidate;
pub use container::Container;
pub use signature::{AudioStream, StreamSignature, VideoStream};
