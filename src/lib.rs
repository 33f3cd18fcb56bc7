pub mod agent;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod forward;
pub mod normalize;
pub mod registry;
pub mod sink;
pub mod transport;
