mod listing;
mod pipeline;
mod publish;

pub use listing::{parse_listing, select_stable, RemoteFileRecord, StabilityDetector};
pub use pipeline::{token_path, DownloadPipeline, DownloadReport};
pub use publish::{FilenamePattern, PublishLayout};
