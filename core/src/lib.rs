// public
pub mod manifest;
pub mod record;
pub mod writer;

mod database;
pub use database::{
    bind::{bind_named, BindError, BoundQuery},
    sqlserver::{DatabaseInfo, SqlServerClient, SqlServerConnectionError},
    EngineError, SqlEngine,
};

mod helpers;
pub use helpers::format_duration;

mod logger;
pub use logger::{setup_info_logger, setup_logger};

pub use manifest::yaml::{read_config, ReadConfigError};
pub use record::{ChangeRecord, Field, Method, Value};
pub use writer::{
    command::WriteCommand,
    executor::ExecutorStatus,
    queue::{ChunkHandler, ChunkOptions},
    script::Script,
    translator::{RecordDefinition, TranslateError},
    WriteError, Writer, WriterOptions,
};

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tracing::{error as sink_error, info as sink_info};
