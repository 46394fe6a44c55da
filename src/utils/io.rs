//! io.rs
//!
//! Readers for the whitespace-separated tables consumed by the command line:
//! domain tables, contact pair lists and chromosome length tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::contacts::ContactTable;
use crate::domains::{Domain, DomainTable};
use crate::errors::{malformed_record, Error};

/// Read a table, yielding the 1-based line number and the fields of every
/// non-empty line that is not a `#` comment.
pub(crate) fn data_lines(path: &Path) -> Result<Vec<(usize, Vec<String>)>> {
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    );
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        lines.push((i + 1, line.split_whitespace().map(str::to_owned).collect()));
    }
    Ok(lines)
}

/// Parse a genomic position. Positions written as floats (e.g. `1.5e6`) are
/// truncated.
fn parse_position(path: &Path, line: usize, value: &str) -> Result<u64> {
    if let Ok(pos) = value.parse::<u64>() {
        return Ok(pos);
    }
    match value.parse::<f64>() {
        Ok(pos) if pos.is_finite() && pos >= 0.0 => Ok(pos.trunc() as u64),
        _ => Err(malformed_record(path, line, &format!("invalid position '{}'", value)).into()),
    }
}

/// Read a domain table. Three-column lines are `chrom start end`; two-column
/// lines are `start end` and are assigned to `contig`.
pub fn read_domain_table<P: AsRef<Path>>(path: P, contig: Option<&str>) -> Result<DomainTable> {
    let path = path.as_ref();
    let mut table = BTreeMap::new();
    for (line_no, fields) in data_lines(path)? {
        let (chrom, start, end) = match fields.len() {
            2 => {
                let chrom = contig.ok_or_else(|| Error::MissingContigName {
                    path: path.to_owned(),
                })?;
                (chrom.to_owned(), &fields[0], &fields[1])
            }
            n if n >= 3 => (fields[0].clone(), &fields[1], &fields[2]),
            _ => {
                return Err(
                    malformed_record(path, line_no, "expected 'chrom start end' or 'start end'")
                        .into(),
                )
            }
        };
        let start = parse_position(path, line_no, start)?;
        let end = parse_position(path, line_no, end)?;
        let domain = Domain::new(start, end).map_err(|e| {
            malformed_record(path, line_no, &e.to_string())
        })?;
        table.entry(chrom).or_insert_with(Vec::new).push(domain);
    }
    debug!(
        "read {} domains on {} contigs from {}",
        table.values().map(Vec::len).sum::<usize>(),
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Read a contact pair list with lines `chrom pos1 pos2 [...]`.
pub fn read_contact_pairs<P: AsRef<Path>>(path: P) -> Result<ContactTable> {
    let path = path.as_ref();
    let mut table = BTreeMap::new();
    for (line_no, fields) in data_lines(path)? {
        if fields.len() < 3 {
            return Err(malformed_record(path, line_no, "expected 'chrom pos1 pos2'").into());
        }
        let first = parse_position(path, line_no, &fields[1])?;
        let second = parse_position(path, line_no, &fields[2])?;
        table
            .entry(fields[0].clone())
            .or_insert_with(Vec::new)
            .push((first, second));
    }
    debug!(
        "read {} contacts on {} contigs from {}",
        table.values().map(Vec::len).sum::<usize>(),
        table.len(),
        path.display()
    );
    Ok(table)
}
