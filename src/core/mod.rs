pub mod access;
pub mod builtin_models;
pub mod chat_stream;
pub mod config;
pub mod controller_pool;
pub mod custom_providers;
pub mod error;
pub mod headers;
pub mod images;
pub mod message;
pub mod model_family;
pub mod model_table;
pub mod params;
pub mod platform;
pub mod shaping;
pub mod smoothing;
