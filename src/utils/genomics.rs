//! genomics.rs
//!
//! Chromosome naming and chromosome length tables.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde_derive::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::errors::malformed_record;
use crate::utils::io::data_lines;

/// Strip "chr" prefix, so both "chr2L" and "2L" normalize to "2L".
pub(crate) fn normalize_chrom(chrom: &str) -> &str {
    chrom.trim_start_matches("chr")
}

/// Natural order of chromosome names: numbered chromosomes first (by number,
/// then by suffix, e.g. 2L < 2R < 3L), then named ones (X, Y, M) alphabetically.
pub fn cmp_chrom(a: &str, b: &str) -> Ordering {
    fn key(chrom: &str) -> (Option<u64>, &str) {
        let chrom = normalize_chrom(chrom);
        let digits = chrom.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            (None, chrom)
        } else {
            (chrom[..digits].parse().ok(), &chrom[digits..])
        }
    }
    let (num_a, rest_a) = key(a);
    let (num_b, rest_b) = key(b);
    match (num_a, num_b) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| rest_a.cmp(rest_b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => rest_a.cmp(rest_b),
    }
    .then_with(|| a.cmp(b))
}

/// Reference genome builds with built-in chromosome lengths.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum GenomeBuild {
    #[strum(serialize = "dm6")]
    Dm6,
    #[strum(serialize = "hg38")]
    Hg38,
}

lazy_static! {
    // UCSC dm6 primary assembly.
    static ref DM6: Vec<(&'static str, u64)> = vec![
        ("chr2L", 23_513_712),
        ("chr2R", 25_286_936),
        ("chr3L", 28_110_227),
        ("chr3R", 32_079_331),
        ("chr4", 1_348_131),
        ("chrX", 23_542_271),
        ("chrY", 3_667_352),
    ];
    // UCSC hg38 primary assembly.
    static ref HG38: Vec<(&'static str, u64)> = vec![
        ("chr1", 248_956_422),
        ("chr2", 242_193_529),
        ("chr3", 198_295_559),
        ("chr4", 190_214_555),
        ("chr5", 181_538_259),
        ("chr6", 170_805_979),
        ("chr7", 159_345_973),
        ("chr8", 145_138_636),
        ("chr9", 138_394_717),
        ("chr10", 133_797_422),
        ("chr11", 135_086_622),
        ("chr12", 133_275_309),
        ("chr13", 114_364_328),
        ("chr14", 107_043_718),
        ("chr15", 101_991_189),
        ("chr16", 90_338_345),
        ("chr17", 83_257_441),
        ("chr18", 80_373_285),
        ("chr19", 58_617_616),
        ("chr20", 64_444_167),
        ("chr21", 46_709_983),
        ("chr22", 50_818_468),
        ("chrX", 156_040_895),
        ("chrY", 57_227_415),
        ("chrM", 16_569),
    ];
}

/// Chromosome name to length lookup. Names are matched with or without a
/// "chr" prefix.
#[derive(Debug, Clone, Default)]
pub struct ChromosomeLengths {
    lengths: HashMap<String, u64>,
}

impl ChromosomeLengths {
    pub fn for_build(build: GenomeBuild) -> Self {
        let table: &[(&str, u64)] = match build {
            GenomeBuild::Dm6 => DM6.as_slice(),
            GenomeBuild::Hg38 => HG38.as_slice(),
        };
        table.iter().map(|(name, len)| (*name, *len)).collect()
    }

    /// Load a two-column `chrom length` table.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut lengths = ChromosomeLengths::default();
        for (line_no, fields) in data_lines(path)? {
            if fields.len() < 2 {
                return Err(malformed_record(path, line_no, "expected chromosome and length").into());
            }
            let len = fields[1].parse::<u64>().map_err(|_| {
                malformed_record(path, line_no, &format!("invalid length '{}'", fields[1]))
            })?;
            lengths.insert(&fields[0], len);
        }
        Ok(lengths)
    }

    pub fn insert(&mut self, chrom: &str, len: u64) {
        self.lengths.insert(normalize_chrom(chrom).to_owned(), len);
    }

    pub fn get(&self, chrom: &str) -> Option<u64> {
        self.lengths.get(normalize_chrom(chrom)).copied()
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

impl<'a> std::iter::FromIterator<(&'a str, u64)> for ChromosomeLengths {
    fn from_iter<I: IntoIterator<Item = (&'a str, u64)>>(iter: I) -> Self {
        let mut lengths = ChromosomeLengths::default();
        for (chrom, len) in iter {
            lengths.insert(chrom, len);
        }
        lengths
    }
}

/// Resolve the length table from an optional file and an optional build;
/// entries from the file take precedence.
pub fn resolve_lengths(
    path: Option<&Path>,
    build: Option<GenomeBuild>,
) -> Result<ChromosomeLengths> {
    let mut lengths = build.map(ChromosomeLengths::for_build).unwrap_or_default();
    if let Some(path) = path {
        let loaded = ChromosomeLengths::from_path(path)
            .with_context(|| format!("failed to read chromosome lengths from {}", path.display()))?;
        lengths.lengths.extend(loaded.lengths);
    }
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_chrom() {
        assert_eq!(normalize_chrom("chr1"), "1");
        assert_eq!(normalize_chrom("1"), "1");
        assert_eq!(normalize_chrom("chrX"), "X");
        assert_eq!(normalize_chrom("2L"), "2L");
    }

    #[test]
    fn test_cmp_chrom() {
        let mut chroms = vec!["chrX", "chr10", "chr2", "3R", "2L", "chrM", "chr1"];
        chroms.sort_by(|a, b| cmp_chrom(a, b));
        assert_eq!(chroms, vec!["chr1", "chr2", "2L", "3R", "chr10", "chrM", "chrX"]);
    }

    #[test]
    fn test_build_lookup_ignores_prefix() {
        let lengths = ChromosomeLengths::for_build(GenomeBuild::Dm6);
        assert_eq!(lengths.get("chrX"), Some(23_542_271));
        assert_eq!(lengths.get("X"), Some(23_542_271));
        assert_eq!(lengths.get("chr3L"), Some(28_110_227));
        assert_eq!(lengths.get("chrZ"), None);
    }

    #[test]
    fn test_build_from_str() {
        assert_eq!(GenomeBuild::from_str("hg38").unwrap(), GenomeBuild::Hg38);
        assert_eq!(GenomeBuild::Dm6.to_string(), "dm6");
        assert!(GenomeBuild::from_str("mm10").is_err());
    }
}
