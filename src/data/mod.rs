//! Dataset collaborator and one-shot class statistics

mod source;
mod stats;

pub use source::{AnnotationSource, InMemoryAnnotations};
pub use stats::{ClassStat, ClassStatistics, DatasetStatCollector};
