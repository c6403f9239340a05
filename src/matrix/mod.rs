pub mod distribute;
pub mod partition;
pub mod sparse;

pub use distribute::distribute_panels;
pub use partition::SupernodePartition;
pub use sparse::CscMatrix;
