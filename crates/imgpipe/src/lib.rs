pub mod batch;
pub mod config;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod resolver;
pub mod services;

pub use batch::{BatchCoordinator, BatchOptions, BatchReport};
pub use config::{load_config, Config};
pub use entry::{ContentEntry, ImageOrigin, StorageMatcher};
pub use error::{
    ConfigError, ImgpipeError, LedgerError, ResolveError, Result, ServiceError,
};
pub use ledger::{LedgerStats, TaskEntry, TaskLedger, TaskStatus};
pub use logging::init_logging;
pub use resolver::{EntryResolver, ImageResolver, ImageResult, ResolverOptions};
pub use services::{
    FileStorage, GeneratedImage, GenerationOptions, HttpDownloader, ImageDownloader,
    ImageGenerator, ImageStorage, UploadMetadata,
};
