pub mod error;
pub mod geometry;
pub mod volume;
pub mod projection;
pub mod transform;
pub mod projector;
pub mod signal;
pub mod motion;
pub mod fourd;
pub mod config;
pub mod phantom;
pub mod utils;

pub use error::Error;
pub use geometry::Geometry;
pub use volume::{Sampling, Volume};
pub use projection::ProjectionStack;
pub use transform::ProjectionTransform;
pub use projector::ProjectorConfig;
pub use signal::PhaseSignal;
pub use motion::{DeformationField, DeformationSequence};
