// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid interval {start}-{end}: start has to be smaller than end")]
    InvalidInterval { start: u64, end: u64 },
    #[error("malformed record in {} at line {line}: {msg}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    #[error("two-column domain table {} requires a contig name (use --contig)", .path.display())]
    MissingContigName { path: PathBuf },
    #[error("bin size has to be positive")]
    InvalidBinSize,
    #[error("invalid window {start}-{end}: start has to be smaller than end")]
    InvalidWindow { start: u64, end: u64 },
    #[error("invalid significance threshold {alpha}: has to be in (0, 1]")]
    InvalidAlpha { alpha: f64 },
    #[error("invalid p-value floor {floor}: has to be in (0, 1)")]
    InvalidPvalueFloor { floor: f64 },
    #[error("smear has to be at least 1")]
    InvalidSmear,
    #[error("hard breakpoint has to be given as exactly two coordinates, got {count}")]
    InvalidHardBreak { count: usize },
    #[error("at least two domain tables are needed for a pairwise comparison")]
    TooFewDomainTables,
}

pub(crate) fn malformed_record(path: &Path, line: usize, msg: &str) -> Error {
    Error::MalformedRecord {
        path: path.to_owned(),
        line,
        msg: msg.to_owned(),
    }
}
