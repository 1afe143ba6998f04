use geo::{BoundingRect, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::feature::ReferenceFeature;

/// Envelope of one reference feature, in degrees, stored in the R-tree.
#[derive(Debug, Clone)]
pub struct IndexedFeature {
    pub index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// A read-only reference feature collection with a spatial index.
#[derive(Debug)]
pub struct ReferenceLayer {
    features: Vec<ReferenceFeature>,
    index: RTree<IndexedFeature>,
}

impl ReferenceLayer {
    pub fn new(features: Vec<ReferenceFeature>) -> Self {
        let indexed: Vec<IndexedFeature> = features
            .iter()
            .enumerate()
            .filter_map(|(index, f)| {
                let rect = f.geometry.as_ref()?.bounding_rect()?;
                Some(IndexedFeature {
                    index,
                    envelope: rect_to_aabb(rect),
                })
            })
            .collect();
        Self {
            features,
            index: RTree::bulk_load(indexed),
        }
    }

    pub fn features(&self) -> &[ReferenceFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Indices of features whose envelope touches `area`, in collection
    /// order. Features without usable geometry are always included so the
    /// matchers can report them.
    pub fn candidates(&self, area: Rect<f64>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&rect_to_aabb(area))
            .map(|f| f.index)
            .collect();
        hits.extend(
            self.features
                .iter()
                .enumerate()
                .filter(|(_, f)| f.geometry.as_ref().and_then(|g| g.bounding_rect()).is_none())
                .map(|(i, _)| i),
        );
        hits.sort_unstable();
        hits
    }
}

impl From<Vec<ReferenceFeature>> for ReferenceLayer {
    fn from(features: Vec<ReferenceFeature>) -> Self {
        Self::new(features)
    }
}
