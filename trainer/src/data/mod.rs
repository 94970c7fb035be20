mod dataloader;
mod dataset;
mod eurosat;
mod split;
mod stats;
mod transform;

pub use dataloader::{Batch, DataLoader};
pub use dataset::{Dataset, InMemoryDataset, Sample, Transformed};
pub use eurosat::{EuroSat, read_tiff};
pub use split::Split;
pub use stats::ChannelStats;
pub use transform::{
    AppendAwei, AppendNormalizedDifferenceIndex, AppendRatioIndex, Compose, Normalize,
    SpectralIndex, Transform,
};
