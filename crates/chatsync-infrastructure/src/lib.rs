pub mod config_service;
pub mod http;
pub mod local_authority;
pub mod memory_store;
pub mod paths;
pub mod storage;
pub mod toml_store;

pub use config_service::{ConfigError, ConfigService};
pub use http::{ApiClient, HttpAccountAuthority, HttpMessageAuthority};
pub use local_authority::LocalAuthority;
pub use memory_store::InMemoryStore;
pub use paths::ChatSyncPaths;
pub use toml_store::TomlFileStore;
