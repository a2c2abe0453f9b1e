//! Core data models for the hairstyle relay.
//!
//! These types describe the two upstream jobs (hairstyle edit and image-to-3D)
//! and where each pipeline stage left its output. Upstream reply shapes are
//! deserialized leniently since the providers do not guarantee them.

pub mod edit_job;
pub mod location;
pub mod model_job;
