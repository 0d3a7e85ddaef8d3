//! Core types for the softquad shader interpreter
//!
//! This crate provides the error handling, configuration, and logging
//! infrastructure shared by the execution machine and the sampler.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ComputeConfig, Config, DebugConfig, ExecConfig, LogLevel, SamplerConfig};
pub use error::{ExecError, Result, SamplerError, SoftquadError};
