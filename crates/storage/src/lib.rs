pub mod disk;
mod store;

pub use disk::{DiskSpaceProbe, DiskStats, StatvfsProbe};
pub use store::ArtifactStore;
