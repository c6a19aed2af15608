pub mod config;
pub mod enqueue;
pub mod error;
/// Queue handlers for the two pipeline stages.
pub mod handlers;
pub mod payload;
pub mod resolver;
pub mod runtime;
pub mod telemetry;

pub use config::{Config, ConfigError, RunMode};
pub use enqueue::{enqueue_detect_parser, enqueue_parse_file};
pub use error::HandlerError;
pub use handlers::{Decoder, DetectParserHandler, ParseFileHandler, PipelineContext};
pub use payload::{DetectParserPayload, ParseFilePayload, DETECT_PARSER_JOB, PARSE_FILE_JOB};
pub use resolver::{
    DownloadReference, FileResolver, HttpFileResolver, LocalFileResolver, ResolveError,
};
pub use runtime::{build_resolver, start_worker};
pub use telemetry::init_tracing;
