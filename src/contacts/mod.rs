// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Binning of paired contact coordinates into square per-contig count matrices.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::AddAssign;

use anyhow::Result;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use log::debug;
use ndarray::Array2;
use serde_derive::Serialize;

use crate::errors::Error;

pub mod flip;

/// Both positions of one contact on a single contig.
pub type ContactPair = (u64, u64);

/// Contact pairs per contig.
pub type ContactTable = BTreeMap<String, Vec<ContactPair>>;

/// Put the smaller coordinate first.
pub fn normalize_orientation(pairs: &[ContactPair]) -> Vec<ContactPair> {
    pairs
        .iter()
        .map(|&(p, q)| if p <= q { (p, q) } else { (q, p) })
        .collect()
}

/// Counters of what happened to the input pairs during binning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinningStats {
    pub binned: usize,
    pub out_of_range: usize,
    pub too_close: usize,
    pub outside_window: usize,
}

impl AddAssign for BinningStats {
    fn add_assign(&mut self, other: Self) {
        self.binned += other.binned;
        self.out_of_range += other.out_of_range;
        self.too_close += other.too_close;
        self.outside_window += other.outside_window;
    }
}

#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct ContactMatrix {
    #[getset(get = "pub")]
    contig: String,
    #[getset(get = "pub")]
    counts: Array2<u32>,
    #[getset(get_copy = "pub")]
    bin_size: u64,
    /// Genomic position of the first bin.
    #[getset(get_copy = "pub")]
    offset: u64,
    #[getset(get_copy = "pub")]
    mirrored: bool,
}

impl ContactMatrix {
    /// Number of rows (and columns).
    pub fn dim(&self) -> usize {
        self.counts.nrows()
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.counts[[row, col]]
    }

    /// Count at `(row, col)`, 0 for cells beyond the matrix.
    pub fn count(&self, row: usize, col: usize) -> u64 {
        self.counts
            .get((row, col))
            .map_or(0, |&count| u64::from(count))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Genomic start position of the given bin.
    pub fn bin_start(&self, bin: usize) -> u64 {
        self.offset + bin as u64 * self.bin_size
    }

    /// Write the full matrix, one tab-separated row per line.
    pub fn write_dense<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .from_writer(sink);
        for row in self.counts.rows() {
            writer.write_record(row.iter().map(|c| c.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write `row col count` triplets of all non-zero cells in row-major order.
    pub fn write_sparse<W: Write>(&self, sink: W) -> Result<()> {
        #[derive(Serialize)]
        struct Cell {
            row: usize,
            col: usize,
            count: u32,
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .from_writer(sink);
        for ((row, col), &count) in self.counts.indexed_iter() {
            if count > 0 {
                writer.serialize(Cell { row, col, count })?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Bins contact pairs of one contig into a square count matrix.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct ContactBinner {
    bin_size: u64,
    /// Also count every contact at its transposed cell.
    #[builder(default = "true")]
    mirror: bool,
    /// Only bin pairs with both positions in this inclusive range.
    #[builder(default)]
    window: Option<(u64, u64)>,
    /// Only bin pairs whose positions are more than this far apart.
    #[builder(default)]
    min_contact_distance: Option<u64>,
}

impl ContactBinner {
    fn validate(&self) -> Result<()> {
        if self.bin_size == 0 {
            return Err(Error::InvalidBinSize.into());
        }
        if let Some((start, end)) = self.window {
            if start >= end {
                return Err(Error::InvalidWindow { start, end }.into());
            }
        }
        Ok(())
    }

    /// Bin the given pairs. If `contig_len` is known (and no window is set),
    /// the matrix covers the whole contig, otherwise it extends to the
    /// largest observed bin.
    pub fn bin(
        &self,
        contig: &str,
        pairs: &[ContactPair],
        contig_len: Option<u64>,
    ) -> Result<(ContactMatrix, BinningStats)> {
        self.validate()?;
        let offset = self.window.map_or(0, |(start, _)| start);
        let mut stats = BinningStats::default();

        let mut retained = Vec::with_capacity(pairs.len());
        for &(p, q) in pairs {
            if let Some((start, end)) = self.window {
                if p < start || p > end || q < start || q > end {
                    stats.outside_window += 1;
                    continue;
                }
            }
            if let Some(min) = self.min_contact_distance {
                if p.max(q) - p.min(q) <= min {
                    stats.too_close += 1;
                    continue;
                }
            }
            retained.push((
                ((p - offset) / self.bin_size) as usize,
                ((q - offset) / self.bin_size) as usize,
            ));
        }

        let dim = match (self.window, contig_len) {
            (Some((start, end)), _) => ((end - start) / self.bin_size) as usize + 1,
            (None, Some(len)) => (len / self.bin_size) as usize + 1,
            (None, None) => retained
                .iter()
                .map(|&(i, j)| i.max(j) + 1)
                .max()
                .unwrap_or(0),
        };

        let mut counts = Array2::zeros((dim, dim));
        for (i, j) in retained {
            if i >= dim || j >= dim {
                stats.out_of_range += 1;
                continue;
            }
            counts[[i, j]] += 1;
            if self.mirror {
                counts[[j, i]] += 1;
            }
            stats.binned += 1;
        }
        if stats.out_of_range > 0 {
            debug!(
                "{}: skipped {} contacts beyond the end of the matrix ({} bins)",
                contig, stats.out_of_range, dim
            );
        }

        Ok((
            ContactMatrix {
                contig: contig.to_owned(),
                counts,
                bin_size: self.bin_size,
                offset,
                mirrored: self.mirror,
            },
            stats,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binner(bin_size: u64) -> ContactBinnerBuilder {
        ContactBinnerBuilder::default().bin_size(bin_size)
    }

    #[test]
    fn test_bin_mirrored_pairs() {
        let (matrix, stats) = binner(100)
            .build()
            .unwrap()
            .bin("chr1", &[(100, 900), (110, 890)], None)
            .unwrap();
        assert_eq!(matrix.dim(), 10);
        assert_eq!(stats.binned, 2);
        for &(i, j) in &[(1, 9), (9, 1), (1, 8), (8, 1)] {
            assert_eq!(matrix.get(i, j), 1);
        }
        assert_eq!(matrix.total(), 4);
        assert_eq!(matrix.count(1, 9), 1);
        assert_eq!(matrix.count(10, 1), 0);
        assert_eq!(matrix.count(1, 42), 0);
    }

    #[test]
    fn test_mirrored_matrix_is_symmetric() {
        let pairs = vec![(5, 1234), (999, 20), (450, 450), (3000, 10), (77, 2999)];
        let (matrix, _) = binner(250)
            .build()
            .unwrap()
            .bin("chr1", &pairs, Some(3000))
            .unwrap();
        assert_eq!(matrix.counts(), &matrix.counts().t());
        // diagonal pair receives both increments
        assert_eq!(matrix.get(1, 1), 2);
        assert_eq!(matrix.total(), 2 * pairs.len() as u64);
    }

    #[test]
    fn test_unmirrored_total_equals_binned_pairs() {
        let (matrix, stats) = binner(10)
            .mirror(false)
            .build()
            .unwrap()
            .bin("chr1", &[(1, 2), (15, 35), (35, 15)], None)
            .unwrap();
        assert_eq!(stats.binned, 3);
        assert_eq!(matrix.total(), 3);
        assert_eq!(matrix.get(1, 3), 1);
        assert_eq!(matrix.get(3, 1), 1);
    }

    #[test]
    fn test_binning_is_idempotent() {
        let binner = binner(40_000).build().unwrap();
        let pairs = vec![(0, 39_999), (40_000, 1_000_000), (123_456, 7_654_321)];
        let (first, _) = binner.bin("chrX", &pairs, Some(23_542_271)).unwrap();
        let (second, _) = binner.bin("chrX", &pairs, Some(23_542_271)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(0, 0), 2);
        assert_eq!(first.get(3, 191), 1);
    }

    #[test]
    fn test_out_of_range_contacts_are_skipped() {
        let (matrix, stats) = binner(100)
            .build()
            .unwrap()
            .bin("chr1", &[(50, 150), (50, 1050)], Some(500))
            .unwrap();
        assert_eq!(matrix.dim(), 6);
        assert_eq!(stats.binned, 1);
        assert_eq!(stats.out_of_range, 1);
    }

    #[test]
    fn test_window_and_min_distance() {
        let (matrix, stats) = binner(100)
            .window(Some((1000, 2000)))
            .min_contact_distance(Some(150))
            .build()
            .unwrap()
            .bin("chr1", &[(1000, 2000), (900, 1500), (1200, 1300), (1100, 1800)], None)
            .unwrap();
        assert_eq!(matrix.dim(), 11);
        assert_eq!(matrix.offset(), 1000);
        assert_eq!(stats.outside_window, 1);
        assert_eq!(stats.too_close, 1);
        assert_eq!(stats.binned, 2);
        assert_eq!(matrix.get(0, 10), 1);
        assert_eq!(matrix.get(1, 8), 1);
        assert_eq!(matrix.bin_start(8), 1800);
    }

    #[test]
    fn test_invalid_configuration() {
        let err = binner(0)
            .build()
            .unwrap()
            .bin("chr1", &[(1, 2)], None)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::InvalidBinSize));
        let err = binner(10)
            .window(Some((50, 50)))
            .build()
            .unwrap()
            .bin("chr1", &[(1, 2)], None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::InvalidWindow { start: 50, end: 50 })
        );
    }

    #[test]
    fn test_writers() {
        let (matrix, _) = binner(10)
            .build()
            .unwrap()
            .bin("chr1", &[(5, 25)], None)
            .unwrap();
        let mut dense = Vec::new();
        matrix.write_dense(&mut dense).unwrap();
        assert_eq!(String::from_utf8(dense).unwrap(), "0\t0\t1\n0\t0\t0\n1\t0\t0\n");
        let mut sparse = Vec::new();
        matrix.write_sparse(&mut sparse).unwrap();
        assert_eq!(String::from_utf8(sparse).unwrap(), "0\t2\t1\n2\t0\t1\n");
    }

    #[test]
    fn test_normalize_orientation() {
        assert_eq!(normalize_orientation(&[(5, 3), (1, 2)]), vec![(3, 5), (1, 2)]);
    }
}
