//! Model-side collaborators: parameters, the segmentor trait and a
//! synthetic reference backend

mod param;
mod segmentor;
mod store;
mod synthetic;

pub use param::Param;
pub use segmentor::{LossMap, LossWeights, Segmentor};
pub use store::ParamStore;
pub use synthetic::{SyntheticBatch, SyntheticHead, SyntheticSegmentor};
