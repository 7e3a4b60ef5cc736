pub mod batch;
#[allow(clippy::module_inception)]
pub mod mutation;

pub use batch::{BatchId, MutationBatch, MutationBatchResult};
pub use mutation::{FieldTransform, Mutation, Precondition, TransformOperation};
