//! hairmatch-core: Face-shape analysis types and haircut recommendations.
//!
//! Defines the photo and analysis types shared across the workspace, the
//! pluggable [`Classifier`] capability with its random stub, and the static
//! haircut catalog used to build tiered recommendations.

pub mod catalog;
pub mod classifier;
pub mod types;

pub use catalog::{HaircutCatalogEntry, Recommendations};
pub use classifier::{Classifier, ClassifierError, RandomClassifier};
pub use types::{Analysis, FaceShape, Photo, PhotoError};
