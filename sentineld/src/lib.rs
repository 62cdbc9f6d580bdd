pub mod alert;
pub mod codec;
pub mod config;
pub mod enrich;
pub mod event;
pub mod metrics;
pub mod rules;
pub mod runtime;
pub mod transport;

pub use config::Config;
pub use metrics::Metrics;
