use crate::sites::geohash;
use crate::sites::loader::SiteDataset;
use crate::types::distance::{great_circle_km, DistanceUnit, SearchRadius};
use crate::types::lat_lon::LatLon;
use crate::types::site::SiteMatch;
use log::debug;
use ordered_float::OrderedFloat;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::collections::BTreeMap;

/// Geohash length used for bucket keys. Precision 7 cells are about 150 m across,
/// fine enough that even sub-mile searches only touch a handful of buckets.
pub const INDEX_PRECISION: usize = 7;

/// A site position on the unit sphere, tagged with the site's index in the dataset.
///
/// Straight-line (chord) distance between unit vectors grows monotonically with
/// great-circle distance, so R-tree nearest-neighbour order equals true distance order.
type SitePoint = GeomWithData<[f64; 3], usize>;

fn unit_vector(location: LatLon) -> [f64; 3] {
    let (lat, lon) = (location.0.to_radians(), location.1.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Spatial index over a [`SiteDataset`].
///
/// Radius searches use geohash buckets to prune candidates before an exact
/// great-circle check; nearest-N searches walk an R-tree.
#[derive(Debug, Clone)]
pub struct SiteLocator {
    dataset: SiteDataset,
    buckets: BTreeMap<String, Vec<usize>>,
    rtree: RTree<SitePoint>,
}

impl SiteLocator {
    pub fn new(dataset: SiteDataset) -> Self {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, site) in dataset.sites.iter().enumerate() {
            buckets
                .entry(geohash::encode(site.location, INDEX_PRECISION))
                .or_default()
                .push(idx);
        }
        let points = dataset
            .sites
            .iter()
            .enumerate()
            .map(|(idx, site)| SitePoint::new(unit_vector(site.location), idx))
            .collect();
        let rtree = RTree::bulk_load(points);
        debug!(
            "Indexed {} sites into {} geohash buckets",
            dataset.sites.len(),
            buckets.len()
        );
        SiteLocator {
            dataset,
            buckets,
            rtree,
        }
    }

    pub fn dataset(&self) -> &SiteDataset {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.sites.is_empty()
    }

    /// Finds every site whose great-circle distance from `center` is at most `radius`.
    ///
    /// Results are sorted by distance (closest first), ties broken by source row, and
    /// distances are reported in the radius' unit.
    pub fn within_radius(&self, center: LatLon, radius: SearchRadius) -> Vec<SiteMatch> {
        let radius_km = radius.km();
        let candidates = self.candidates(center, radius_km);

        let mut matches: Vec<(f64, usize)> = candidates
            .into_iter()
            .filter_map(|idx| {
                let dist_km = great_circle_km(center, self.dataset.sites[idx].location);
                (dist_km <= radius_km).then_some((dist_km, idx))
            })
            .collect();
        matches.sort_by_key(|&(dist_km, idx)| (OrderedFloat(dist_km), self.dataset.sites[idx].row));

        matches
            .into_iter()
            .map(|(dist_km, idx)| self.to_match(idx, dist_km, radius.unit()))
            .collect()
    }

    /// Site indices that may lie within `radius_km` of `center`: the contents of the
    /// buckets under the 3x3 geohash neighbourhood, or every site when no geohash
    /// precision can cover the radius.
    fn candidates(&self, center: LatLon, radius_km: f64) -> Vec<usize> {
        let Some(precision) = geohash::precision_for_radius(center, radius_km, INDEX_PRECISION)
        else {
            debug!(
                "Radius {} km around {} needs a full scan of {} sites",
                radius_km,
                center,
                self.len()
            );
            return (0..self.len()).collect();
        };

        let cells = geohash::neighbourhood(center, precision);
        let candidates: Vec<usize> = cells
            .iter()
            .flat_map(|cell| {
                self.buckets
                    .range(cell.clone()..)
                    .take_while(move |(key, _)| key.starts_with(cell.as_str()))
                    .flat_map(|(_, indices)| indices.iter().copied())
            })
            .collect();
        debug!(
            "Geohash precision {} ({} cells) yielded {} of {} sites as candidates",
            precision,
            cells.len(),
            candidates.len(),
            self.len()
        );
        candidates
    }

    /// Finds up to `n_results` sites closest to `center`, optionally bounded by `max_distance`.
    ///
    /// Distances are reported in `unit`. Results are sorted by distance, closest first.
    pub fn nearest(
        &self,
        center: LatLon,
        n_results: usize,
        max_distance: Option<SearchRadius>,
        unit: DistanceUnit,
    ) -> Vec<SiteMatch> {
        if n_results == 0 {
            return vec![];
        }
        let max_km = max_distance.map(|r| r.km());
        let query = unit_vector(center);

        let mut found: Vec<(f64, usize)> = Vec::with_capacity(n_results);
        // Distance of the n-th site once n sites are collected. Sites tied with it are
        // still collected so the row order, not the tree layout, decides which are kept.
        let mut cutoff_km: Option<f64> = None;
        for point in self.rtree.nearest_neighbor_iter(&query) {
            let idx = point.data;
            let dist_km = great_circle_km(center, self.dataset.sites[idx].location);
            if max_km.is_some_and(|max| dist_km > max) || cutoff_km.is_some_and(|c| dist_km > c) {
                // Iteration is in increasing distance, nothing further can qualify.
                break;
            }
            found.push((dist_km, idx));
            if cutoff_km.is_none() && found.len() == n_results {
                cutoff_km = found.iter().map(|&(d, _)| d).reduce(f64::max);
            }
        }
        found.sort_by_key(|&(dist_km, idx)| (OrderedFloat(dist_km), self.dataset.sites[idx].row));
        found.truncate(n_results);

        found
            .into_iter()
            .map(|(dist_km, idx)| self.to_match(idx, dist_km, unit))
            .collect()
    }

    fn to_match(&self, idx: usize, dist_km: f64, unit: DistanceUnit) -> SiteMatch {
        SiteMatch {
            site: self.dataset.sites[idx].clone(),
            distance: unit.from_km(dist_km),
            unit,
        }
    }
}
