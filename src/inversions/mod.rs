// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Calling of inversion breakpoints from a test and a control contact table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use derive_builder::Builder;
use getset::Getters;
use itertools::Itertools;
use log::{info, warn};
use rayon::prelude::*;
use serde_derive::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::contacts::flip::revert_inversion;
use crate::contacts::{
    normalize_orientation, BinningStats, ContactBinnerBuilder, ContactMatrix, ContactPair,
    ContactTable,
};
use crate::errors::Error;
use crate::utils::genomics::{cmp_chrom, ChromosomeLengths};

pub mod breakpoint;
pub mod significance;

pub use breakpoint::{estimate, Centroid, Zygosity};
pub use significance::{Bin, Region, RegionMap, RegionTracer, SignificanceMap};

/// Maximal ratio of the last row to the first column of a region's bounding
/// box. Regions touching the diagonal are not reported.
const DIAGONAL_CLEARANCE: f64 = 0.975;

/// A reported inversion breakpoint. All coordinates in bp.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[getset(get = "pub")]
pub struct BreakpointPrediction {
    contig: String,
    group: usize,
    size: usize,
    max_significance: f64,
    mean_significance: f64,
    xmin: u64,
    xmax: u64,
    ymin: u64,
    ymax: u64,
    start: u64,
    end: u64,
    zygosity: Zygosity,
    converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ReportFormat {
    #[strum(serialize = "full")]
    Full,
    #[strum(serialize = "minimal")]
    Minimal,
}

/// Write predictions as tab-separated table. The full format has a header
/// and all diagnostic fields, the minimal one only `contig start end`.
pub fn write_predictions<W: Write>(
    sink: W,
    predictions: &[BreakpointPrediction],
    format: ReportFormat,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(format == ReportFormat::Full)
        .delimiter(b'\t')
        .from_writer(sink);
    for prediction in predictions {
        match format {
            ReportFormat::Full => writer.serialize(prediction)?,
            ReportFormat::Minimal => writer.write_record(&[
                prediction.contig.clone(),
                prediction.start.to_string(),
                prediction.end.to_string(),
            ])?,
        }
    }
    writer.flush()?;
    Ok(())
}

/// Aggregated counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub contigs: Vec<String>,
    pub skipped_contigs: Vec<String>,
    pub test_binning: BinningStats,
    pub control_binning: BinningStats,
    pub floored_pvalues: usize,
    pub regions: usize,
    pub predictions: usize,
    pub flipped_predictions: usize,
}

impl RunSummary {
    pub fn write_json<W: Write>(&self, sink: W) -> Result<()> {
        serde_json::to_writer_pretty(sink, self)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct Calls {
    predictions: Vec<BreakpointPrediction>,
    /// Predictions on the test contacts after reverting the homozygous
    /// predictions.
    flipped: Vec<BreakpointPrediction>,
    summary: RunSummary,
}

/// Everything computed for one contig.
struct ContigAnalysis {
    test: ContactMatrix,
    control: ContactMatrix,
    test_stats: BinningStats,
    control_stats: BinningStats,
    significance: SignificanceMap,
    regions: RegionMap,
    predictions: Vec<BreakpointPrediction>,
}

#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct Caller {
    #[builder(default = "40_000")]
    bin_size: u64,
    /// Ignore contacts with positions at most this far apart.
    #[builder(default)]
    min_contact_distance: Option<u64>,
    /// Only test bins more than this many bins off the diagonal.
    #[builder(default = "2")]
    min_distance: usize,
    #[builder(default = "1e-7")]
    alpha: f64,
    #[builder(default = "3")]
    min_region_size: usize,
    #[builder(default = "25")]
    smear: usize,
    #[builder(default = "significance::DEFAULT_PVALUE_FLOOR")]
    pvalue_floor: f64,
    /// Fixed breakpoint in bp, used instead of the estimated centroid.
    #[builder(default)]
    hard_break: Option<(u64, u64)>,
    #[builder(default)]
    flip_test: bool,
    #[builder(default)]
    chromosome_lengths: ChromosomeLengths,
    /// Write matrices and grids per contig with this path prefix, and the
    /// reverted contacts of the flip test.
    #[builder(default)]
    dump_prefix: Option<PathBuf>,
}

impl CallerBuilder {
    /// Set the hard breakpoint from a list of coordinates, which has to
    /// contain exactly a start and an end.
    pub fn hard_break_coordinates(self, coordinates: &[u64]) -> Result<Self> {
        match coordinates {
            [] => Ok(self),
            [start, end] => Ok(self.hard_break(Some((*start, *end)))),
            _ => Err(Error::InvalidHardBreak {
                count: coordinates.len(),
            }
            .into()),
        }
    }
}

impl Caller {
    fn tracer(&self) -> Result<RegionTracer> {
        Ok(RegionTracer::new(self.alpha, self.smear)?)
    }

    /// Call inversion breakpoints on every contig present in both tables.
    pub fn call(&self, test: &ContactTable, control: &ContactTable) -> Result<Calls> {
        // fail early on invalid settings
        self.tracer()?;

        let mut summary = RunSummary::default();
        let contigs = test
            .keys()
            .sorted_by(|a, b| cmp_chrom(a, b))
            .filter(|contig| {
                if control.contains_key(*contig) {
                    true
                } else {
                    warn!("skipping {}: no control contacts", contig);
                    summary.skipped_contigs.push((*contig).clone());
                    false
                }
            })
            .collect_vec();
        for contig in control.keys().filter(|contig| !test.contains_key(*contig)) {
            warn!("skipping {}: no test contacts", contig);
            summary.skipped_contigs.push(contig.clone());
        }

        info!("Step 1: analysing {} contigs", contigs.len());
        let analyses = contigs
            .par_iter()
            .map(|contig| {
                let analysis = self.analyse(contig, &test[*contig], &control[*contig])?;
                if let Some(ref prefix) = self.dump_prefix {
                    dump(prefix, contig, &analysis)?;
                }
                Ok(analysis)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut calls = Calls::default();
        for (contig, analysis) in contigs.iter().zip(analyses) {
            summary.contigs.push((*contig).clone());
            summary.test_binning += analysis.test_stats;
            summary.control_binning += analysis.control_stats;
            summary.floored_pvalues += analysis.significance.floored();
            summary.regions += analysis.regions.regions().len();
            if self.flip_test {
                calls
                    .flipped
                    .extend(self.flip(contig, &test[*contig], &control[*contig], &analysis)?);
            }
            calls.predictions.extend(analysis.predictions);
        }
        summary.predictions = calls.predictions.len();
        summary.flipped_predictions = calls.flipped.len();

        info!(
            "Step 2: found {} breakpoints in {} regions ({} p-values floored; \
             {} test and {} control contacts out of range; \
             {} test and {} control contacts too close)",
            summary.predictions,
            summary.regions,
            summary.floored_pvalues,
            summary.test_binning.out_of_range,
            summary.control_binning.out_of_range,
            summary.test_binning.too_close,
            summary.control_binning.too_close
        );
        if self.flip_test {
            info!(
                "Step 3: {} breakpoints remain after reverting homozygous inversions",
                summary.flipped_predictions
            );
        }
        calls.summary = summary;
        Ok(calls)
    }

    fn analyse(
        &self,
        contig: &str,
        test_pairs: &[ContactPair],
        control_pairs: &[ContactPair],
    ) -> Result<ContigAnalysis> {
        let binner = ContactBinnerBuilder::default()
            .bin_size(self.bin_size)
            .mirror(false)
            .min_contact_distance(self.min_contact_distance)
            .build()?;
        let contig_len = self.chromosome_lengths.get(contig);
        if contig_len.is_none() {
            warn!(
                "{}: unknown length, matrix extends to the last observed contact",
                contig
            );
        }
        let (test, test_stats) =
            binner.bin(contig, &normalize_orientation(test_pairs), contig_len)?;
        let (control, control_stats) =
            binner.bin(contig, &normalize_orientation(control_pairs), contig_len)?;

        let significance =
            SignificanceMap::compute(&test, &control, self.min_distance, self.pvalue_floor)
                .with_context(|| format!("failed to test contact changes on {}", contig))?;
        let regions = self.tracer()?.trace(&significance);

        let hard_break = self.hard_break.map(|(start, end)| {
            (
                (start / self.bin_size) as usize,
                (end / self.bin_size) as usize,
            )
        });
        let predictions = regions
            .regions()
            .iter()
            .filter_map(|region| self.predict(contig, region, &test, hard_break))
            .collect_vec();
        info!(
            "{}: {} regions, {} breakpoints",
            contig,
            regions.regions().len(),
            predictions.len()
        );

        Ok(ContigAnalysis {
            test,
            control,
            test_stats,
            control_stats,
            significance,
            regions,
            predictions,
        })
    }

    /// Turn a region into a prediction, unless it is too small or too close
    /// to the diagonal.
    fn predict(
        &self,
        contig: &str,
        region: &Region,
        test: &ContactMatrix,
        hard_break: Option<(usize, usize)>,
    ) -> Option<BreakpointPrediction> {
        let (min_row, max_row, min_col, max_col) = region.bounding_box();
        let to_bp = |bin: usize| bin as u64 * self.bin_size;
        let (xmin, xmax, ymin, ymax) = (to_bp(min_row), to_bp(max_row), to_bp(min_col), to_bp(max_col));
        if region.len() <= self.min_region_size || xmax as f64 >= DIAGONAL_CLEARANCE * ymin as f64 {
            return None;
        }

        let bins = region.bins().collect_vec();
        let weights = bins
            .iter()
            .map(|bin| test.count(bin.row, bin.col) as f64)
            .collect_vec();
        let centroid = estimate(&bins, &weights, hard_break);
        if !centroid.converged() {
            warn!(
                "{}: centroid of region {} did not converge after {} evaluations",
                contig,
                region.id(),
                centroid.evaluations()
            );
        }
        let coord_to_bp = |coord: f64| (coord.max(0.0) * self.bin_size as f64).round() as u64;

        Some(BreakpointPrediction {
            contig: contig.to_owned(),
            group: region.id(),
            size: region.len(),
            max_significance: region.max_score(),
            mean_significance: region.mean_score(),
            xmin,
            xmax,
            ymin,
            ymax,
            start: coord_to_bp(centroid.row()),
            end: coord_to_bp(centroid.col()),
            zygosity: centroid.zygosity(),
            converged: centroid.converged(),
        })
    }

    /// Revert all homozygous predictions in the test contacts and call again.
    fn flip(
        &self,
        contig: &str,
        test_pairs: &[ContactPair],
        control_pairs: &[ContactPair],
        analysis: &ContigAnalysis,
    ) -> Result<Vec<BreakpointPrediction>> {
        let mut flipped = test_pairs.to_vec();
        let mut reverted = 0;
        for prediction in &analysis.predictions {
            if prediction.zygosity == Zygosity::Homozygous && prediction.start < prediction.end {
                revert_inversion(&mut flipped, prediction.start, prediction.end);
                reverted += 1;
            }
        }
        if reverted == 0 {
            return Ok(Vec::new());
        }
        info!("{}: reverted {} homozygous inversions", contig, reverted);
        if let Some(ref prefix) = self.dump_prefix {
            write_pairs(create(&dump_path(prefix, contig, "flipped_pairs"))?, contig, &flipped)?;
        }
        Ok(self.analyse(contig, &flipped, control_pairs)?.predictions)
    }
}

fn dump_path(prefix: &Path, contig: &str, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(format!(".{}.{}.tsv", contig, suffix));
    PathBuf::from(name)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path).with_context(|| {
        format!("failed to create {}", path.display())
    })?))
}

fn dump(prefix: &Path, contig: &str, analysis: &ContigAnalysis) -> Result<()> {
    let path = |suffix: &str| dump_path(prefix, contig, suffix);
    analysis.test.write_sparse(create(&path("test"))?)?;
    analysis.control.write_sparse(create(&path("control"))?)?;
    analysis.significance.write_grid(create(&path("significance"))?)?;
    analysis.regions.write_grid(create(&path("groups"))?)?;
    Ok(())
}

/// Write contacts as `chrom pos1 pos2` lines, readable by `read_contact_pairs`.
pub fn write_pairs<W: Write>(sink: W, contig: &str, pairs: &[ContactPair]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(sink);
    for &(first, second) in pairs {
        writer.serialize((contig, first, second))?;
    }
    writer.flush()?;
    Ok(())
}
