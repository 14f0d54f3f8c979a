#![forbid(unsafe_code)]

pub mod archive;
pub mod assets;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod pipeline;
