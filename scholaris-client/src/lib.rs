//! Scholaris client library exports.
//!
//! Wires the REST backend into the query cache: configuration, the
//! envelope-decoding REST client, the key factory, the feature mutations
//! views call, uploads, toasts and tracing setup.

pub mod api_client;
pub mod client;
pub mod config;
pub mod error;
pub mod features;
pub mod keys;
pub mod notifications;
pub mod telemetry;
pub mod upload;

pub use api_client::{ApiClientError, ApiQueryFetcher, RestClient, ScholarisApi};
pub use client::{ScholarisClient, Viewer};
pub use config::{ConfigError, ScholarisConfig};
pub use error::{ClientError, ClientResult};
pub use notifications::{Notification, NotificationAction, NotificationCenter, NotificationLevel};
pub use telemetry::init_tracing;
pub use upload::UploadRequest;
