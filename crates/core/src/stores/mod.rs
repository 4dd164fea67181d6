pub mod local;
pub mod qdrant;

pub use local::{cosine_similarity, LocalIndexProvider, LocalVectorIndex};
pub use qdrant::{QdrantIndexProvider, QdrantVectorIndex};
