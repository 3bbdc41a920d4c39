//! Static haircut catalog and tiered recommendations.

use crate::types::FaceShape;
use serde::Serialize;

/// Maximum number of non-premium cuts shown on the free tier.
pub const FREE_TIER_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One haircut in the read-only catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HaircutCatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub image: &'static str,
    pub difficulty: Difficulty,
    pub suitable_faces: &'static [FaceShape],
    pub trending: bool,
    pub premium: bool,
}

impl HaircutCatalogEntry {
    pub fn suits(&self, shape: FaceShape) -> bool {
        self.suitable_faces.contains(&shape)
    }
}

/// Display text for a face shape.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FaceShapeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub tips: &'static str,
}

use FaceShape::{Diamond, Heart, Oblong, Oval, Round, Square};

static CATALOG: [HaircutCatalogEntry; 6] = [
    HaircutCatalogEntry {
        id: "1",
        name: "Classic Bob",
        description: "Timeless cut that flatters oval and round faces",
        image: "https://images.unsplash.com/photo-1594736797933-d0401ba2fe65?w=400&h=400&fit=crop",
        difficulty: Difficulty::Easy,
        suitable_faces: &[Oval, Round, Heart],
        trending: true,
        premium: false,
    },
    HaircutCatalogEntry {
        id: "2",
        name: "Modern Pixie",
        description: "Bold cut, ideal for oval and diamond faces",
        image: "https://images.unsplash.com/photo-1580618672591-eb180b1a973f?w=400&h=400&fit=crop",
        difficulty: Difficulty::Hard,
        suitable_faces: &[Oval, Diamond, Heart],
        trending: true,
        premium: true,
    },
    HaircutCatalogEntry {
        id: "3",
        name: "Long Bob (Lob)",
        description: "Maximum versatility for every face shape",
        image: "https://images.unsplash.com/photo-1616683693504-3ea7e9ad6fec?w=400&h=400&fit=crop",
        difficulty: Difficulty::Medium,
        suitable_faces: &[Oval, Round, Square, Heart, Diamond, Oblong],
        trending: false,
        premium: false,
    },
    HaircutCatalogEntry {
        id: "4",
        name: "Modern Shag",
        description: "Layered cut that adds movement and texture",
        image: "https://images.unsplash.com/photo-1522337360788-8b13dee7a37e?w=400&h=400&fit=crop",
        difficulty: Difficulty::Medium,
        suitable_faces: &[Oval, Square, Oblong],
        trending: true,
        premium: true,
    },
    HaircutCatalogEntry {
        id: "5",
        name: "Long Layers",
        description: "Elegance and movement for long hair",
        image: "https://images.unsplash.com/photo-1487412912498-0447578fcca8?w=400&h=400&fit=crop",
        difficulty: Difficulty::Easy,
        suitable_faces: &[Oval, Round, Square],
        trending: false,
        premium: false,
    },
    HaircutCatalogEntry {
        id: "6",
        name: "Curtain Bangs",
        description: "Curtain fringe that softens angular features",
        image: "https://images.unsplash.com/photo-1508214751196-bcfd4ca60f91?w=400&h=400&fit=crop",
        difficulty: Difficulty::Medium,
        suitable_faces: &[Square, Diamond, Oblong],
        trending: true,
        premium: true,
    },
];

/// The full catalog, in display order.
pub fn catalog() -> &'static [HaircutCatalogEntry] {
    &CATALOG
}

pub fn face_shape_info(shape: FaceShape) -> FaceShapeInfo {
    match shape {
        Oval => FaceShapeInfo {
            name: "Oval",
            description: "Balanced face with a forehead slightly wider than the chin",
            tips: "Lucky you! Almost every cut works for you.",
        },
        Round => FaceShapeInfo {
            name: "Round",
            description: "Similar width and height, with soft contours",
            tips: "Volume on top with shorter sides flatters your face.",
        },
        Square => FaceShapeInfo {
            name: "Square",
            description: "Forehead, cheekbones and jaw of similar width",
            tips: "Soft layers help ease the angles.",
        },
        Heart => FaceShapeInfo {
            name: "Heart",
            description: "Wide forehead with a narrower chin",
            tips: "Cuts that add volume at the bottom balance the proportions.",
        },
        Diamond => FaceShapeInfo {
            name: "Diamond",
            description: "Wide cheekbones with a narrow forehead and chin",
            tips: "Volume at the temples and chin is ideal.",
        },
        Oblong => FaceShapeInfo {
            name: "Oblong",
            description: "Face longer than it is wide, with straight contours",
            tips: "Volume at the sides helps balance the length.",
        },
    }
}

/// Catalog entries that suit `shape`, trending cuts first.
///
/// The sort is stable, so catalog order is kept within each group.
pub fn recommend(shape: FaceShape) -> Vec<&'static HaircutCatalogEntry> {
    let mut matches: Vec<_> = CATALOG.iter().filter(|cut| cut.suits(shape)).collect();
    matches.sort_by_key(|cut| !cut.trending);
    matches
}

/// Recommendations split into the free and premium tiers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub face_shape: FaceShape,
    pub free: Vec<&'static HaircutCatalogEntry>,
    pub premium: Vec<&'static HaircutCatalogEntry>,
    /// True when the premium tier should be shown locked (upsell).
    pub premium_locked: bool,
}

impl Recommendations {
    pub fn for_shape(shape: FaceShape, is_premium: bool) -> Self {
        let all = recommend(shape);
        let free = all
            .iter()
            .copied()
            .filter(|cut| !cut.premium)
            .take(FREE_TIER_LIMIT)
            .collect();
        let premium = all.into_iter().filter(|cut| cut.premium).collect();

        Self {
            face_shape: shape,
            free,
            premium,
            premium_locked: !is_premium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(cuts: &[&HaircutCatalogEntry]) -> Vec<&'static str> {
        cuts.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_every_shape_has_a_recommendation() {
        for shape in FaceShape::ALL {
            assert!(!recommend(shape).is_empty(), "{shape} has no cuts");
        }
    }

    #[test]
    fn test_recommend_puts_trending_first() {
        // Oval suits 1 (trending), 2 (trending), 3, 4 (trending), 5.
        assert_eq!(ids(&recommend(FaceShape::Oval)), vec!["1", "2", "4", "3", "5"]);
    }

    #[test]
    fn test_free_tier_is_capped_and_non_premium() {
        let recs = Recommendations::for_shape(FaceShape::Oval, false);
        assert_eq!(ids(&recs.free), vec!["1", "3"]);
        assert!(recs.free.iter().all(|c| !c.premium));
        assert_eq!(ids(&recs.premium), vec!["2", "4"]);
        assert!(recs.premium_locked);
    }

    #[test]
    fn test_premium_user_unlocks_premium_tier() {
        let recs = Recommendations::for_shape(FaceShape::Square, true);
        assert!(!recs.premium_locked);
        assert_eq!(ids(&recs.premium), vec!["4", "6"]);
        assert_eq!(ids(&recs.free), vec!["3", "5"]);
    }

    #[test]
    fn test_face_shape_info_names() {
        assert_eq!(face_shape_info(FaceShape::Oblong).name, "Oblong");
        assert_eq!(face_shape_info(FaceShape::Heart).name, "Heart");
    }
}
