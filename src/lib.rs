pub mod config;
pub mod error;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod store;
pub mod timeline;
pub mod video;

#[cfg(test)]
mod testing;
