pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;


pub use audio::{FrameReader, StreamDecoder};
pub use config::{ConfigManager, DecoderConfig};
pub use error::*;
pub use models::*;
