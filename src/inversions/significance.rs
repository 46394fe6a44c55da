// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-bin significance of contact frequency changes and grouping of
//! significant bins into contiguous regions.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;

use anyhow::Result;
use bio::stats::LogProb;
use derive_new::new;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use log::debug;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde_derive::Serialize;

use crate::contacts::ContactMatrix;
use crate::errors::Error;
use crate::utils::stats::{fisher_exact_two_sided, significance_score};

/// Matrix cell. Ordered row-major.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Bin {
    pub row: usize,
    pub col: usize,
}

impl Bin {
    /// Bins reachable by 1 to `smear` steps in one of the four cardinal
    /// directions.
    fn reach(self, smear: usize) -> impl Iterator<Item = Bin> {
        (1..=smear).flat_map(move |step| {
            let up = self.row.checked_sub(step).map(|row| Bin::new(row, self.col));
            let down = self.row.checked_add(step).map(|row| Bin::new(row, self.col));
            let left = self.col.checked_sub(step).map(|col| Bin::new(self.row, col));
            let right = self.col.checked_add(step).map(|col| Bin::new(self.row, col));
            up.into_iter().chain(down).chain(left).chain(right)
        })
    }
}

/// Significance score (-log10 p) of every tested bin.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct SignificanceMap {
    #[getset(get_copy = "pub")]
    dim: usize,
    #[getset(get = "pub")]
    scores: BTreeMap<Bin, f64>,
    /// Number of bins whose p-value was replaced by the floor.
    #[getset(get_copy = "pub")]
    floored: usize,
}

impl SignificanceMap {
    /// Test every bin with `|row - col| > min_distance` that has contacts in
    /// the test or control matrix for a change of its share of all contacts.
    /// P-values that are not finite or below `pvalue_floor` are replaced by
    /// the floor.
    pub fn compute(
        test: &ContactMatrix,
        control: &ContactMatrix,
        min_distance: usize,
        pvalue_floor: f64,
    ) -> Result<Self> {
        if !(pvalue_floor > 0.0 && pvalue_floor < 1.0) {
            return Err(Error::InvalidPvalueFloor {
                floor: pvalue_floor,
            }
            .into());
        }
        let ln_floor = pvalue_floor.ln();
        let dim = test.dim().max(control.dim());
        let test_total = test.total();
        let control_total = control.total();

        let rows: Vec<Vec<(Bin, f64, bool)>> = (0..dim)
            .into_par_iter()
            .map(|row| {
                (0..dim)
                    .filter(|&col| row.max(col) - row.min(col) > min_distance)
                    .filter_map(|col| {
                        let t = test.count(row, col);
                        let c = control.count(row, col);
                        if t == 0 && c == 0 {
                            return None;
                        }
                        let p = fisher_exact_two_sided(t, test_total - t, c, control_total - c);
                        let degenerate = !p.is_finite() || *p < ln_floor;
                        let p = if degenerate { LogProb(ln_floor) } else { p };
                        Some((Bin::new(row, col), significance_score(p), degenerate))
                    })
                    .collect()
            })
            .collect();

        let mut scores = BTreeMap::new();
        let mut floored = 0;
        for (bin, score, degenerate) in rows.into_iter().flatten() {
            if degenerate {
                floored += 1;
            }
            scores.insert(bin, score);
        }
        debug!(
            "{}: tested {} bins, {} p-values floored",
            test.contig(),
            scores.len(),
            floored
        );

        Ok(SignificanceMap {
            dim,
            scores,
            floored,
        })
    }

    /// Build a map from precomputed scores.
    pub fn from_scores<I: IntoIterator<Item = (Bin, f64)>>(dim: usize, scores: I) -> Self {
        SignificanceMap {
            dim,
            scores: scores.into_iter().collect(),
            floored: 0,
        }
    }

    pub fn score(&self, bin: Bin) -> Option<f64> {
        self.scores.get(&bin).copied()
    }

    /// Write the score grid, untested bins as 0.
    pub fn write_grid<W: Write>(&self, sink: W) -> Result<()> {
        write_grid(sink, self.dim, |bin| {
            self.score(bin).map_or_else(|| "0".to_owned(), |s| s.to_string())
        })
    }
}

/// A group of significant bins.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Region {
    #[getset(get_copy = "pub")]
    id: usize,
    /// Members with their scores, in row-major order.
    #[getset(get = "pub")]
    members: Vec<(Bin, f64)>,
}

impl Region {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        self.members.iter().map(|(bin, _)| *bin)
    }

    /// `(min_row, max_row, min_col, max_col)`.
    pub fn bounding_box(&self) -> (usize, usize, usize, usize) {
        let (min_row, max_row) = self
            .bins()
            .map(|bin| bin.row)
            .minmax()
            .into_option()
            .unwrap_or((0, 0));
        let (min_col, max_col) = self
            .bins()
            .map(|bin| bin.col)
            .minmax()
            .into_option()
            .unwrap_or((0, 0));
        (min_row, max_row, min_col, max_col)
    }

    pub fn max_score(&self) -> f64 {
        self.members
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn mean_score(&self) -> f64 {
        self.members.iter().map(|(_, score)| score).sum::<f64>() / self.members.len() as f64
    }
}

/// Regions and the group assignment of every significant bin.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct RegionMap {
    #[getset(get_copy = "pub")]
    dim: usize,
    #[getset(get = "pub")]
    regions: Vec<Region>,
    #[getset(get = "pub")]
    assignments: HashMap<Bin, usize>,
}

impl RegionMap {
    pub fn group(&self, bin: Bin) -> Option<usize> {
        self.assignments.get(&bin).copied()
    }

    /// Write the group grid, unassigned bins as -1.
    pub fn write_grid<W: Write>(&self, sink: W) -> Result<()> {
        write_grid(sink, self.dim, |bin| {
            self.group(bin)
                .map_or_else(|| "-1".to_owned(), |id| id.to_string())
        })
    }
}

/// Grows regions of significant bins. A bin is significant if its score
/// exceeds -log10(alpha); significant bins within `smear` steps along a row
/// or column end up in the same region.
#[derive(Debug, Clone, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RegionTracer {
    alpha: f64,
    smear: usize,
}

impl RegionTracer {
    pub fn new(alpha: f64, smear: usize) -> Result<Self, Error> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidAlpha { alpha });
        }
        if smear == 0 {
            return Err(Error::InvalidSmear);
        }
        Ok(RegionTracer { alpha, smear })
    }

    pub fn threshold(&self) -> f64 {
        -self.alpha.log10()
    }

    /// Seeds are taken in descending score order (ties row-major); each
    /// seed absorbs all reachable significant bins through a worklist.
    pub fn trace(&self, map: &SignificanceMap) -> RegionMap {
        let threshold = self.threshold();
        let candidates: HashMap<Bin, f64> = map
            .scores()
            .iter()
            .filter(|(_, &score)| score > threshold)
            .map(|(&bin, &score)| (bin, score))
            .collect();
        let seeds = candidates
            .iter()
            .map(|(&bin, &score)| (Reverse(OrderedFloat(score)), bin))
            .sorted()
            .map(|(_, bin)| bin)
            .collect_vec();

        let mut assignments = HashMap::new();
        let mut regions = Vec::new();
        for seed in seeds {
            if assignments.contains_key(&seed) {
                continue;
            }
            let id = regions.len();
            let mut members = vec![(seed, candidates[&seed])];
            assignments.insert(seed, id);
            let mut queue = VecDeque::new();
            queue.push_back(seed);
            while let Some(bin) = queue.pop_front() {
                for other in bin.reach(self.smear) {
                    if let Some(&score) = candidates.get(&other) {
                        if !assignments.contains_key(&other) {
                            assignments.insert(other, id);
                            members.push((other, score));
                            queue.push_back(other);
                        }
                    }
                }
            }
            members.sort_by_key(|(bin, _)| *bin);
            regions.push(Region { id, members });
        }
        debug!(
            "traced {} regions from {} significant bins",
            regions.len(),
            candidates.len()
        );

        RegionMap {
            dim: map.dim(),
            regions,
            assignments,
        }
    }
}

/// Compute the significance map of `test` against `control` and trace its
/// regions, with the default p-value floor.
pub fn trace(
    test: &ContactMatrix,
    control: &ContactMatrix,
    min_distance: usize,
    alpha: f64,
    smear: usize,
) -> Result<(SignificanceMap, RegionMap)> {
    let tracer = RegionTracer::new(alpha, smear)?;
    let map = SignificanceMap::compute(test, control, min_distance, DEFAULT_PVALUE_FLOOR)?;
    let regions = tracer.trace(&map);
    Ok((map, regions))
}

pub const DEFAULT_PVALUE_FLOOR: f64 = 1e-300;

fn write_grid<W: Write, F: Fn(Bin) -> String>(sink: W, dim: usize, value: F) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(sink);
    for row in 0..dim {
        writer.write_record((0..dim).map(|col| value(Bin::new(row, col))))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactBinnerBuilder;

    fn scores(entries: &[(usize, usize, f64)]) -> SignificanceMap {
        SignificanceMap::from_scores(
            100,
            entries
                .iter()
                .map(|&(row, col, score)| (Bin::new(row, col), score)),
        )
    }

    #[test]
    fn test_outlier_beyond_smear_forms_own_group() {
        let map = scores(&[
            (10, 20, 12.0),
            (10, 21, 9.0),
            (11, 20, 8.0),
            (10, 40, 11.0),
            (50, 50, 2.0),
        ]);
        let regions = RegionTracer::new(1e-7, 3).unwrap().trace(&map);
        assert_eq!(regions.regions().len(), 2);
        // highest score seeds the first group
        assert_eq!(regions.group(Bin::new(10, 20)), Some(0));
        assert_eq!(regions.group(Bin::new(10, 21)), Some(0));
        assert_eq!(regions.group(Bin::new(11, 20)), Some(0));
        assert_eq!(regions.group(Bin::new(10, 40)), Some(1));
        // below threshold
        assert_eq!(regions.group(Bin::new(50, 50)), None);
        assert_eq!(regions.regions()[0].len(), 3);
        assert_eq!(regions.regions()[0].bounding_box(), (10, 11, 20, 21));
        assert_relative_eq!(regions.regions()[0].max_score(), 12.0);
        assert_relative_eq!(regions.regions()[0].mean_score(), 29.0 / 3.0);
    }

    #[test]
    fn test_regions_chain_through_smear_steps() {
        let map = scores(&[(5, 5, 10.0), (5, 8, 10.0), (5, 11, 10.0), (5, 15, 10.0)]);
        let regions = RegionTracer::new(1e-7, 3).unwrap().trace(&map);
        assert_eq!(regions.regions().len(), 2);
        assert_eq!(regions.group(Bin::new(5, 5)), regions.group(Bin::new(5, 11)));
        assert_ne!(regions.group(Bin::new(5, 11)), regions.group(Bin::new(5, 15)));
        // diagonal neighbours are not connected
        let map = scores(&[(5, 5, 10.0), (6, 6, 10.0)]);
        assert_eq!(RegionTracer::new(1e-7, 3).unwrap().trace(&map).regions().len(), 2);
    }

    #[test]
    fn test_tracing_partitions_candidates_deterministically() {
        let entries: Vec<(usize, usize, f64)> = (0..30)
            .map(|i| ((i * 7) % 23, (i * 13) % 29, 7.5 + (i % 4) as f64))
            .collect();
        let map = scores(&entries);
        let tracer = RegionTracer::new(1e-7, 2).unwrap();
        let first = tracer.trace(&map);
        let second = tracer.trace(&map);
        assert_eq!(first, second);

        let candidates = map.scores().values().filter(|&&s| s > 7.0).count();
        let members: usize = first.regions().iter().map(Region::len).sum();
        assert_eq!(members, candidates);
        assert_eq!(first.assignments().len(), candidates);
        for region in first.regions() {
            for bin in region.bins() {
                assert_eq!(first.group(bin), Some(region.id()));
            }
        }
    }

    #[test]
    fn test_invalid_tracer_configuration() {
        assert_eq!(
            RegionTracer::new(0.0, 3).unwrap_err(),
            Error::InvalidAlpha { alpha: 0.0 }
        );
        assert_eq!(RegionTracer::new(0.01, 0).unwrap_err(), Error::InvalidSmear);
    }

    #[test]
    fn test_compute_from_matrices() {
        let binner = ContactBinnerBuilder::default()
            .bin_size(10)
            .mirror(false)
            .build()
            .unwrap();
        let mut test_pairs = vec![(5, 95); 200];
        test_pairs.extend(vec![(5, 45); 200]);
        let control_pairs = vec![(5, 45); 400];
        let (test, _) = binner.bin("chr1", &test_pairs, Some(100)).unwrap();
        let (control, _) = binner.bin("chr1", &control_pairs, Some(100)).unwrap();

        let map = SignificanceMap::compute(&test, &control, 2, DEFAULT_PVALUE_FLOOR).unwrap();
        assert_eq!(map.dim(), 11);
        assert_eq!(map.scores().len(), 2);
        assert!(map.score(Bin::new(0, 9)).unwrap() > 7.0);
        assert!(map.score(Bin::new(0, 4)).unwrap() > 7.0);
        // too close to the diagonal
        assert_eq!(map.score(Bin::new(0, 2)), None);

        let (map, regions) = trace(&test, &control, 2, 1e-7, 3).unwrap();
        assert_eq!(map.scores().len(), 2);
        assert_eq!(regions.regions().len(), 2);
    }

    #[test]
    fn test_underflowing_pvalues_are_floored() {
        let binner = ContactBinnerBuilder::default()
            .bin_size(10)
            .mirror(false)
            .build()
            .unwrap();
        let mut test_pairs = vec![(5, 95); 200];
        test_pairs.extend(vec![(5, 45); 200]);
        let control_pairs = vec![(5, 45); 400];
        let (test, _) = binner.bin("chr1", &test_pairs, Some(100)).unwrap();
        let (control, _) = binner.bin("chr1", &control_pairs, Some(100)).unwrap();

        let map = SignificanceMap::compute(&test, &control, 2, 1e-5).unwrap();
        assert_eq!(map.floored(), 2);
        assert_relative_eq!(map.score(Bin::new(0, 9)).unwrap(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(map.score(Bin::new(0, 4)).unwrap(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_floor() {
        let binner = ContactBinnerBuilder::default().bin_size(10).build().unwrap();
        let (matrix, _) = binner.bin("chr1", &[(5, 95)], None).unwrap();
        let err = SignificanceMap::compute(&matrix, &matrix, 2, 0.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::InvalidPvalueFloor { floor: 0.0 })
        );
    }

    #[test]
    fn test_grids() {
        let map = SignificanceMap::from_scores(2, vec![(Bin::new(0, 1), 9.5)]);
        let regions = RegionTracer::new(1e-7, 1).unwrap().trace(&map);
        let mut out = Vec::new();
        regions.write_grid(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "-1\t0\n-1\t-1\n");
        let mut out = Vec::new();
        map.write_grid(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0\t9.5\n0\t0\n");
    }
}
