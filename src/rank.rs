//! Ranking of per-feature envelopes by area.
//!
//! At coarse zoom levels there is rarely room for every feature, so the largest ones are
//! served first. This module only produces the ordering; picking how many to keep is up to
//! the caller.

use crate::coord::BoundingBox;
use crate::error::{Error, Result};

/// The bounding box of a single feature, tagged with that feature's unique key.
#[derive(Clone, Debug, PartialEq)]
pub struct Extent<K> {
    pub bounds: BoundingBox,
    pub key: K,
}

impl<K> Extent<K> {
    pub fn new(key: K, bounds: BoundingBox) -> Result<Extent<K>> {
        bounds.validate()?;
        Ok(Extent { bounds, key })
    }

    /// Builds an extent from a closed envelope ring of `[lon, lat]` points.
    ///
    /// The corners are taken as the minimum and maximum over the ring, so the vertex order
    /// the envelope was emitted in does not matter.
    pub fn from_ring(key: K, ring: &[[f64; 2]]) -> Result<Extent<K>> {
        if ring.len() < 3 {
            return Err(Error::InconsistentEnvelopeShape(format!(
                "ring has {} points, at least 3 are required",
                ring.len()
            )));
        }

        let bounds = BoundingBox::from_points(ring)?;
        Extent::new(key, bounds)
    }

    /// Area in square degrees. Good for ranking, not for measuring.
    pub fn area(&self) -> f64 {
        self.bounds.area()
    }
}

/// Sorts extents by descending area. Equal areas keep their input order.
pub fn rank<K>(mut extents: Vec<Extent<K>>) -> Vec<Extent<K>> {
    extents.sort_by(|a, b| b.area().total_cmp(&a.area()));
    extents
}

/// Turns `(key, envelope ring)` pairs into extents and ranks them.
///
/// Fails on the first malformed ring.
pub fn rank_envelopes<K, R, I>(envelopes: I) -> Result<Vec<Extent<K>>>
where
    I: IntoIterator<Item = (K, R)>,
    R: AsRef<[[f64; 2]]>,
{
    let extents = envelopes
        .into_iter()
        .map(|(key, ring)| Extent::from_ring(key, ring.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    Ok(rank(extents))
}
