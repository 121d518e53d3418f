//! mf-av: external tool integration for mp3forge.
//!
//! Provides tool discovery ([`ToolRegistry`]), a timeout-aware command
//! builder ([`ToolCommand`]), and the [`MediaConverter`] capability with its
//! ffmpeg-backed implementation ([`FfmpegConverter`]).

pub mod command;
pub mod converter;
pub mod tools;

pub use command::{CommandError, ToolCommand, ToolOutput};
pub use converter::{ConversionError, FfmpegConverter, MediaConverter, ProgressFn};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
