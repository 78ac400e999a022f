//! Core data models for the geocoding pipeline.

pub mod record;

pub use record::{AddressRecord, Coordinate, Status};
