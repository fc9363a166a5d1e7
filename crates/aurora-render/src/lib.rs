//! Mapping normalized intents onto vendor schemas and rendering payloads.

pub mod generator;
pub mod mapper;

pub use generator::ConfigGenerator;
pub use mapper::{MappingOutcome, PathMapper, SkippedDevice};

#[cfg(test)]
pub(crate) mod fixtures;
