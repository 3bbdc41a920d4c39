//! Face-shape classifier capability.
//!
//! The session controller only sees the [`Classifier`] trait. The shipped
//! implementation is [`RandomClassifier`], a stub that draws a uniformly
//! random shape and an integer confidence in [80, 99].

use crate::types::{Analysis, FaceShape, Photo};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use thiserror::Error;

/// Lowest confidence the stub reports (inclusive).
pub const STUB_MIN_CONFIDENCE: u8 = 80;
/// Highest confidence the stub reports (inclusive).
pub const STUB_MAX_CONFIDENCE: u8 = 99;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
}

/// Strategy for classifying the face shape in a still photo.
///
/// Implementations may be long-running; the caller awaits the result while
/// remaining able to cancel. Identical photos are not required to produce
/// identical results.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, photo: &Photo) -> Result<Analysis, ClassifierError>;
}

/// Stub classifier with uniformly random output.
pub struct RandomClassifier {
    rng: Mutex<StdRng>,
}

impl RandomClassifier {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible output sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for RandomClassifier {
    async fn analyze(&self, photo: &Photo) -> Result<Analysis, ClassifierError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| ClassifierError::AnalysisFailed("classifier state poisoned".into()))?;

        let face_shape = *FaceShape::ALL
            .choose(&mut *rng)
            .ok_or_else(|| ClassifierError::AnalysisFailed("no face shapes defined".into()))?;
        let confidence = rng.gen_range(STUB_MIN_CONFIDENCE..=STUB_MAX_CONFIDENCE);

        tracing::debug!(
            width = photo.width(),
            height = photo.height(),
            %face_shape,
            confidence,
            "stub classifier produced result"
        );

        Ok(Analysis {
            face_shape,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn photo() -> Photo {
        Photo::from_luma(2, 2, vec![90u8; 4]).unwrap()
    }

    #[tokio::test]
    async fn test_stub_respects_confidence_range() {
        let classifier = RandomClassifier::seeded(7);
        let photo = photo();
        for _ in 0..500 {
            let analysis = classifier.analyze(&photo).await.unwrap();
            assert!(
                (STUB_MIN_CONFIDENCE..=STUB_MAX_CONFIDENCE).contains(&analysis.confidence),
                "confidence out of range: {}",
                analysis.confidence
            );
            assert!(FaceShape::ALL.contains(&analysis.face_shape));
        }
    }

    #[tokio::test]
    async fn test_stub_covers_every_shape() {
        let classifier = RandomClassifier::seeded(42);
        let photo = photo();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            seen.insert(classifier.analyze(&photo).await.unwrap().face_shape);
        }
        assert_eq!(seen.len(), FaceShape::ALL.len());
    }

    #[tokio::test]
    async fn test_seeded_stub_is_reproducible() {
        let a = RandomClassifier::seeded(1234);
        let b = RandomClassifier::seeded(1234);
        let photo = photo();
        for _ in 0..20 {
            assert_eq!(
                a.analyze(&photo).await.unwrap(),
                b.analyze(&photo).await.unwrap()
            );
        }
    }
}
