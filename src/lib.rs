pub mod channel;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod docs;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod process;
pub mod registry;
pub mod rewrite;

pub use channel::Channel;
pub use error::Error;
pub use manifest::Manifest;
