//! Nacos config client - Rust HTTP SDK for Nacos configuration management
//!
//! This crate provides:
//! - Config CRUD over the Nacos open API with retry and server failover
//! - Long-polling change detection with subscriber fan-out
//! - Username/password and access-key authentication
//! - Local failover and snapshot files for disaster recovery
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nacos_config_client::{ClientConfig, FnConfigChangeListener, NacosConfigService};
//!
//! # async fn run() -> nacos_config_client::Result<()> {
//! let service = NacosConfigService::new(
//!     ClientConfig::new("http://127.0.0.1:8848").with_auth("nacos", "nacos"),
//! )
//! .await?;
//!
//! service.publish_config("app-config", "DEFAULT_GROUP", "greeting=hello").await?;
//! let value = service.get_config("app-config", "DEFAULT_GROUP").await?;
//! println!("config: {:?}", value);
//!
//! let _handle = service
//!     .subscribe(
//!         "app-config",
//!         "DEFAULT_GROUP",
//!         Arc::new(FnConfigChangeListener::new(|event| {
//!             println!("changed: {}", event.content);
//!         })),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod client_config;
pub mod config;
pub mod error;
pub mod http;
pub mod local_config;
pub mod model;
pub mod server_list;
pub mod wire;

pub use client_config::ClientConfig;
pub use config::listener::{
    AsyncConfigChangeListener, ConfigChangeListener, FnConfigChangeListener, ListenerHandle,
};
pub use config::NacosConfigService;
pub use error::{ConfigError, Result};
pub use model::{ConfigChangeEvent, ConfigData, ConfigKey, LocalConfigData, DEFAULT_GROUP};
