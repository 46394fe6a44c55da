// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::info;
use structopt::StructOpt;

use crate::contacts::ContactBinnerBuilder;
use crate::domains::{self, report};
use crate::errors::Error;
use crate::inversions::{self, ReportFormat};
use crate::utils::genomics::{cmp_chrom, resolve_lengths, GenomeBuild};
use crate::utils::io::{read_contact_pairs, read_domain_table};

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "hicdiff",
    about = "Differential analysis of Hi-C contact matrices and chromatin domains.",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub struct Hicdiff {
    #[structopt(long, short, help = "Print debug information.")]
    pub verbose: bool,
    #[structopt(long, short = "t", help = "Number of threads to use (default: all cores).")]
    pub threads: Option<usize>,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt, Clone)]
pub enum Command {
    #[structopt(
        name = "bin",
        about = "Bin contact pairs into per-contig contact matrices.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    Bin {
        #[structopt(
            parse(from_os_str),
            help = "Contact pairs as whitespace-separated lines 'chrom pos1 pos2'."
        )]
        contacts: PathBuf,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Prefix of the output files; one matrix is written per contig to <prefix>.<contig>.tsv."
        )]
        output_prefix: PathBuf,
        #[structopt(long, default_value = "40000", help = "Bin size in bp.")]
        bin_size: u64,
        #[structopt(long, help = "Only bin this contig.")]
        contig: Option<String>,
        #[structopt(
            long,
            number_of_values = 2,
            help = "Only bin contacts with both positions in this inclusive range (start end)."
        )]
        window: Vec<u64>,
        #[structopt(
            long,
            help = "Ignore contacts with positions at most this far apart (in bp)."
        )]
        min_contact_distance: Option<u64>,
        #[structopt(long, help = "Do not count contacts at the transposed cell.")]
        no_mirror: bool,
        #[structopt(long, help = "Write non-zero cells as 'row col count' triplets.")]
        sparse: bool,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Table with contig lengths ('chrom length')."
        )]
        chromosome_lengths: Option<PathBuf>,
        #[structopt(
            long,
            possible_values = &["dm6", "hg38"],
            help = "Genome build with built-in contig lengths."
        )]
        genome: Option<GenomeBuild>,
    },
    #[structopt(
        name = "compare-domains",
        about = "Classify differences between domain tables (expansion, reduction, merge, division, insertion, deletion).",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    CompareDomains {
        #[structopt(
            parse(from_os_str),
            help = "Domain tables ('chrom start end' or 'start end'); every ordered pair is compared."
        )]
        tables: Vec<PathBuf>,
        #[structopt(long, help = "Contig of two-column domain tables.")]
        contig: Option<String>,
        #[structopt(long, help = "Only compare these contigs.")]
        restrict: Vec<String>,
        #[structopt(
            long,
            default_value = "5",
            help = "Number of most severe events to report per comparison and event type."
        )]
        top: usize,
        #[structopt(
            long,
            help = "Report reciprocal merge/division events only once."
        )]
        deduplicate: bool,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Output file (if omitted, write to STDOUT)."
        )]
        output: Option<PathBuf>,
    },
    #[structopt(
        name = "find-inversions",
        about = "Find inversion breakpoints from significant contact changes of a test sample against a control.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    FindInversions {
        #[structopt(parse(from_os_str), help = "Contact pairs of the test sample.")]
        test: PathBuf,
        #[structopt(parse(from_os_str), help = "Contact pairs of the control sample.")]
        control: PathBuf,
        #[structopt(long, default_value = "40000", help = "Bin size in bp.")]
        bin_size: u64,
        #[structopt(
            long,
            help = "Ignore contacts with positions at most this far apart (in bp)."
        )]
        min_contact_distance: Option<u64>,
        #[structopt(
            long,
            default_value = "2",
            help = "Only test bins more than this many bins away from the diagonal."
        )]
        min_distance: usize,
        #[structopt(long, default_value = "1e-7", help = "Significance threshold.")]
        alpha: f64,
        #[structopt(
            long,
            default_value = "3",
            help = "Only report regions with more significant bins than this."
        )]
        min_region_size: usize,
        #[structopt(
            long,
            default_value = "25",
            help = "Maximal number of bins along a row or column between bins of the same region."
        )]
        smear: usize,
        #[structopt(
            long,
            default_value = "1e-300",
            help = "Smallest p-value; smaller or degenerate p-values are replaced by it."
        )]
        pvalue_floor: f64,
        #[structopt(
            long,
            number_of_values = 2,
            help = "Use this breakpoint (start end, in bp) instead of estimating it."
        )]
        hard_break: Vec<u64>,
        #[structopt(
            long,
            help = "Revert homozygous inversions in the test contacts and call again."
        )]
        flip_test: bool,
        #[structopt(long, help = "Only report 'contig start end'.")]
        minimal: bool,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Table with contig lengths ('chrom length')."
        )]
        chromosome_lengths: Option<PathBuf>,
        #[structopt(
            long,
            possible_values = &["dm6", "hg38"],
            help = "Genome build with built-in contig lengths."
        )]
        genome: Option<GenomeBuild>,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Write contact matrices, significance and group grids (and reverted contacts of the flip test) per contig with this prefix."
        )]
        dump_prefix: Option<PathBuf>,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Write breakpoints after the flip test to this file."
        )]
        flipped_output: Option<PathBuf>,
        #[structopt(parse(from_os_str), long, help = "Write a JSON run summary to this file.")]
        summary: Option<PathBuf>,
        #[structopt(
            parse(from_os_str),
            long,
            help = "Output file (if omitted, write to STDOUT)."
        )]
        output: Option<PathBuf>,
    },
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path).with_context(|| {
        format!("failed to create {}", path.display())
    })?))
}

fn output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(create(path)?),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

fn window(coordinates: &[u64]) -> Result<Option<(u64, u64)>> {
    match coordinates {
        [] => Ok(None),
        [start, end] if start < end => Ok(Some((*start, *end))),
        [start, end] => Err(Error::InvalidWindow {
            start: *start,
            end: *end,
        }
        .into()),
        _ => Err(anyhow!("expected a single window, got {} coordinates", coordinates.len())),
    }
}

/// Label tables by file stem, or by full path where stems collide.
fn labels(paths: &[PathBuf]) -> Vec<String> {
    let stem = |path: &PathBuf| {
        path.file_stem()
            .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned())
    };
    let counts = paths.iter().map(stem).counts();
    paths
        .iter()
        .map(|path| {
            let label = stem(path);
            if counts[&label] > 1 {
                path.display().to_string()
            } else {
                label
            }
        })
        .collect()
}

pub fn run(opt: Hicdiff) -> Result<()> {
    if let Some(threads) = opt.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match opt.command {
        Command::Bin {
            ref contacts,
            ref output_prefix,
            bin_size,
            ref contig,
            ref window,
            min_contact_distance,
            no_mirror,
            sparse,
            ref chromosome_lengths,
            genome,
        } => {
            let lengths = resolve_lengths(chromosome_lengths.as_deref(), genome)?;
            let binner = ContactBinnerBuilder::default()
                .bin_size(bin_size)
                .mirror(!no_mirror)
                .window(self::window(window)?)
                .min_contact_distance(min_contact_distance)
                .build()?;
            let table = read_contact_pairs(contacts)
                .with_context(|| format!("failed to read contacts from {}", contacts.display()))?;

            for (name, pairs) in table
                .iter()
                .filter(|(name, _)| contig.as_ref().map_or(true, |contig| contig == *name))
                .sorted_by(|(a, _), (b, _)| cmp_chrom(a, b))
            {
                let (matrix, stats) = binner.bin(name, pairs, lengths.get(name))?;
                let mut path = output_prefix.as_os_str().to_owned();
                path.push(format!(".{}.tsv", name));
                let path = PathBuf::from(path);
                if sparse {
                    matrix.write_sparse(create(&path)?)?;
                } else {
                    matrix.write_dense(create(&path)?)?;
                }
                info!(
                    "{}: binned {} contacts into {}x{} bins ({} out of range, {} too close, {} outside window)",
                    name,
                    stats.binned,
                    matrix.dim(),
                    matrix.dim(),
                    stats.out_of_range,
                    stats.too_close,
                    stats.outside_window
                );
            }
        }
        Command::CompareDomains {
            ref tables,
            ref contig,
            ref restrict,
            top,
            deduplicate,
            ref output,
        } => {
            let tables = tables
                .iter()
                .zip(labels(tables))
                .map(|(path, label)| {
                    let table = read_domain_table(path, contig.as_deref()).with_context(|| {
                        format!("failed to read domains from {}", path.display())
                    })?;
                    Ok((label, table))
                })
                .collect::<Result<Vec<_>>>()?;
            let restrict = if restrict.is_empty() {
                None
            } else {
                Some(restrict.as_slice())
            };

            info!("Step 1: comparing {} domain tables", tables.len());
            let result = domains::compare_pairwise(&tables, restrict, deduplicate)?;
            info!(
                "Step 2: writing the top {} events of {} comparisons ({} contigs skipped)",
                top,
                result.comparisons().len(),
                result.skipped().len()
            );
            report::write_top_events(self::output(output.as_ref())?, result.comparisons(), top)?;
        }
        Command::FindInversions {
            ref test,
            ref control,
            bin_size,
            min_contact_distance,
            min_distance,
            alpha,
            min_region_size,
            smear,
            pvalue_floor,
            ref hard_break,
            flip_test,
            minimal,
            ref chromosome_lengths,
            genome,
            ref dump_prefix,
            ref flipped_output,
            ref summary,
            ref output,
        } => {
            let lengths = resolve_lengths(chromosome_lengths.as_deref(), genome)?;
            let caller = inversions::CallerBuilder::default()
                .bin_size(bin_size)
                .min_contact_distance(min_contact_distance)
                .min_distance(min_distance)
                .alpha(alpha)
                .min_region_size(min_region_size)
                .smear(smear)
                .pvalue_floor(pvalue_floor)
                .hard_break_coordinates(hard_break)?
                .flip_test(flip_test)
                .chromosome_lengths(lengths)
                .dump_prefix(dump_prefix.clone())
                .build()?;

            let test_contacts = read_contact_pairs(test)
                .with_context(|| format!("failed to read contacts from {}", test.display()))?;
            let control_contacts = read_contact_pairs(control)
                .with_context(|| format!("failed to read contacts from {}", control.display()))?;
            let calls = caller.call(&test_contacts, &control_contacts)?;

            let format = if minimal {
                ReportFormat::Minimal
            } else {
                ReportFormat::Full
            };
            inversions::write_predictions(self::output(output.as_ref())?, calls.predictions(), format)?;
            if let Some(path) = flipped_output {
                inversions::write_predictions(create(path)?, calls.flipped(), format)?;
            }
            if let Some(path) = summary {
                calls.summary().write_json(create(path)?)?;
            }
        }
    }
    Ok(())
}
