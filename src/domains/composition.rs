//! Fractional composition of one domain set in terms of another.

use std::collections::BTreeSet;

use getset::Getters;
use itertools::Itertools;
use ndarray::Array2;

use super::Domain;

/// Disjoint segment `[start, end)` owned by one interval of the other set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: u64,
    end: u64,
    owner: usize,
}

/// Point to interval lookup over a set of possibly overlapping intervals.
/// Where intervals overlap, the one appearing later in the input owns the
/// point.
#[derive(Debug, Clone)]
struct PointLookup {
    segments: Vec<Segment>,
}

impl PointLookup {
    fn new(intervals: &[Domain]) -> Self {
        // (position, is_start, index); ends sort before starts at the same
        // position because intervals are half-open.
        let boundaries = intervals
            .iter()
            .enumerate()
            .flat_map(|(i, d)| vec![(d.start(), true, i), (d.end(), false, i)])
            .sorted()
            .collect_vec();

        let mut segments: Vec<Segment> = Vec::new();
        let mut active = BTreeSet::new();
        for (idx, &(pos, is_start, i)) in boundaries.iter().enumerate() {
            if is_start {
                active.insert(i);
            } else {
                active.remove(&i);
            }
            let next = match boundaries.get(idx + 1) {
                Some(&(next, _, _)) if next > pos => next,
                _ => continue,
            };
            if let Some(&owner) = active.iter().next_back() {
                match segments.last_mut() {
                    Some(last) if last.owner == owner && last.end == pos => last.end = next,
                    _ => segments.push(Segment {
                        start: pos,
                        end: next,
                        owner,
                    }),
                }
            }
        }
        PointLookup { segments }
    }

    /// Segments overlapping `[start, end)`, clipped to it.
    fn overlaps(&self, start: u64, end: u64) -> impl Iterator<Item = Segment> + '_ {
        let first = self.segments.partition_point(|s| s.end <= start);
        self.segments[first..]
            .iter()
            .take_while(move |s| s.start < end)
            .map(move |s| Segment {
                start: s.start.max(start),
                end: s.end.min(end),
                owner: s.owner,
            })
    }
}

/// Composition of every base domain (rows) in terms of the domains of the
/// other set (columns). Entry `(i, j)` is the fraction of base domain `i`
/// covered by other domain `j`; `boundary[i]` is the fraction covered by
/// no domain of the other set.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct CompositionMatrix {
    #[getset(get = "pub")]
    fractions: Array2<f64>,
    #[getset(get = "pub")]
    boundary: Vec<f64>,
    uncovered: Vec<u64>,
    lengths: Vec<u64>,
}

impl CompositionMatrix {
    pub fn build(base: &[Domain], other: &[Domain]) -> Self {
        let lookup = PointLookup::new(other);
        let mut fractions = Array2::zeros((base.len(), other.len()));
        let mut boundary = Vec::with_capacity(base.len());
        let mut uncovered = Vec::with_capacity(base.len());

        for (i, domain) in base.iter().enumerate() {
            let len = domain.len();
            let mut covered = 0;
            for segment in lookup.overlaps(domain.start(), domain.end()) {
                let overlap = segment.end - segment.start;
                covered += overlap;
                fractions[[i, segment.owner]] += overlap as f64 / len as f64;
            }
            uncovered.push(len - covered);
            boundary.push((len - covered) as f64 / len as f64);
        }

        CompositionMatrix {
            fractions,
            boundary,
            uncovered,
            lengths: base.iter().map(Domain::len).collect(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.fractions.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.fractions.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.fractions[[row, col]]
    }

    /// Sum of row fractions, i.e. the covered fraction of the base domain.
    pub fn row_total(&self, row: usize) -> f64 {
        1.0 - self.boundary[row]
    }

    /// Whether the base domain is fully covered by the other set. Decided on
    /// integer lengths, not on the sum of fractions.
    pub fn is_row_complete(&self, row: usize) -> bool {
        self.uncovered[row] == 0
    }

    /// Whether the base domain does not overlap any domain of the other set.
    pub fn is_row_empty(&self, row: usize) -> bool {
        self.uncovered[row] == self.lengths[row]
    }
}
