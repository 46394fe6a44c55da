// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Comparison of chromatin domain sets between a control and a test state.

use std::collections::BTreeMap;
use std::fmt;

use getset::{CopyGetters, Getters};
use itertools::Itertools;
use log::{info, warn};
use rayon::prelude::*;
use serde_derive::Serialize;

use crate::errors::Error;
use crate::utils::genomics::cmp_chrom;

pub mod composition;
pub mod events;
pub mod report;

pub use composition::CompositionMatrix;
pub use events::{classify, DomainPair, Event, EventKind, EventSite, Events};

/// A domain as half-open interval `[start, end)` on one contig.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, CopyGetters, Serialize,
)]
#[getset(get_copy = "pub")]
pub struct Domain {
    start: u64,
    end: u64,
}

impl Domain {
    pub fn new(start: u64, end: u64) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::InvalidInterval { start, end });
        }
        Ok(Domain { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Domains per contig.
pub type DomainTable = BTreeMap<String, Vec<Domain>>;

/// Composition matrices and classified events of one control/test pair of
/// domain lists on a single contig.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Comparison {
    contig: String,
    control: Vec<Domain>,
    test: Vec<Domain>,
    control_composition: CompositionMatrix,
    test_composition: CompositionMatrix,
    events: Events,
}

impl Comparison {
    /// Both domain lists are sorted before any matrix is built, so that
    /// neighbouring rows and columns are neighbouring domains.
    pub fn new(contig: &str, mut control: Vec<Domain>, mut test: Vec<Domain>) -> Self {
        control.sort();
        test.sort();
        let control_composition = CompositionMatrix::build(&control, &test);
        let test_composition = CompositionMatrix::build(&test, &control);
        let events = classify(&control, &test, &control_composition, &test_composition);

        Comparison {
            contig: contig.to_owned(),
            control,
            test,
            control_composition,
            test_composition,
            events,
        }
    }

    pub fn deduplicate(&mut self) {
        self.events.deduplicate();
    }
}

/// A comparison together with the labels of the two compared tables.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct LabeledComparison {
    control_label: String,
    test_label: String,
    comparison: Comparison,
}

/// A contig that could not be compared because one of the tables has no
/// domains on it.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize)]
#[getset(get = "pub")]
pub struct SkippedContig {
    control_label: String,
    test_label: String,
    contig: String,
}

#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct PairwiseComparisons {
    comparisons: Vec<LabeledComparison>,
    skipped: Vec<SkippedContig>,
}

/// Compare every ordered pair of distinct tables on every contig present in
/// both. If `contigs` is given, only these contigs are considered.
pub fn compare_pairwise(
    tables: &[(String, DomainTable)],
    contigs: Option<&[String]>,
    deduplicate: bool,
) -> Result<PairwiseComparisons, Error> {
    if tables.len() < 2 {
        return Err(Error::TooFewDomainTables);
    }
    let selected = |contig: &str| contigs.map_or(true, |contigs| contigs.iter().any(|c| c == contig));

    let mut tasks = Vec::new();
    let mut skipped = Vec::new();
    for (i, j) in (0..tables.len()).cartesian_product(0..tables.len()) {
        if i == j {
            continue;
        }
        let (control_label, control) = &tables[i];
        let (test_label, test) = &tables[j];
        let all_contigs = control
            .keys()
            .chain(test.keys())
            .unique()
            .filter(|contig| selected(contig))
            .sorted_by(|a, b| cmp_chrom(a, b));
        for contig in all_contigs {
            match (control.get(contig), test.get(contig)) {
                (Some(control_domains), Some(test_domains)) => {
                    tasks.push((control_label, test_label, contig, control_domains, test_domains))
                }
                _ => {
                    warn!(
                        "skipping {} in {} vs {}: no domains in one of the tables",
                        contig, control_label, test_label
                    );
                    skipped.push(SkippedContig {
                        control_label: control_label.clone(),
                        test_label: test_label.clone(),
                        contig: contig.clone(),
                    });
                }
            }
        }
    }

    info!("comparing domains in {} contig pairs", tasks.len());
    let comparisons = tasks
        .into_par_iter()
        .map(|(control_label, test_label, contig, control, test)| {
            let mut comparison = Comparison::new(contig, control.clone(), test.clone());
            if deduplicate {
                comparison.deduplicate();
            }
            LabeledComparison {
                control_label: control_label.clone(),
                test_label: test_label.clone(),
                comparison,
            }
        })
        .collect();

    Ok(PairwiseComparisons {
        comparisons,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(bounds: &[(u64, u64)]) -> Vec<Domain> {
        bounds
            .iter()
            .map(|&(start, end)| Domain::new(start, end).unwrap())
            .collect()
    }

    fn table(contig: &str, bounds: &[(u64, u64)]) -> DomainTable {
        let mut table = DomainTable::new();
        table.insert(contig.to_owned(), domains(bounds));
        table
    }

    #[test]
    fn test_zero_length_domain_is_rejected() {
        assert_eq!(
            Domain::new(100, 100),
            Err(Error::InvalidInterval {
                start: 100,
                end: 100
            })
        );
        assert!(Domain::new(200, 100).is_err());
    }

    #[test]
    fn test_domain_basics() {
        let domain = Domain::new(10, 20).unwrap();
        assert_eq!(domain.len(), 10);
        assert!(domain.contains(10));
        assert!(!domain.contains(20));
        assert_eq!(domain.to_string(), "10-20");
    }

    #[test]
    fn test_identical_sets_have_no_events() {
        let set = domains(&[(0, 100), (100, 250), (250, 400)]);
        let comparison = Comparison::new("chr1", set.clone(), set);
        assert!(comparison.events().is_empty());
    }

    #[test]
    fn test_comparison_sorts_domains() {
        let comparison = Comparison::new(
            "chr1",
            domains(&[(100, 200), (0, 100)]),
            domains(&[(0, 100), (100, 200)]),
        );
        assert_eq!(comparison.control(), &domains(&[(0, 100), (100, 200)]));
        assert!(comparison.events().is_empty());
    }

    #[test]
    fn test_compare_pairwise() {
        let mut a = table("chr2L", &[(0, 100), (100, 200)]);
        a.insert("chrX".to_owned(), domains(&[(0, 50)]));
        let b = table("chr2L", &[(0, 200)]);
        let tables = vec![("a".to_owned(), a), ("b".to_owned(), b)];

        let result = compare_pairwise(&tables, None, false).unwrap();
        assert_eq!(result.comparisons().len(), 2);
        assert_eq!(result.skipped().len(), 2);
        assert!(result.skipped().iter().all(|s| s.contig() == "chrX"));

        let a_vs_b = &result.comparisons()[0];
        assert_eq!(a_vs_b.control_label(), "a");
        assert_eq!(a_vs_b.test_label(), "b");
        assert_eq!(a_vs_b.comparison().events().get(EventKind::Merge).len(), 2);

        let only_x = vec!["chrX".to_owned()];
        let restricted = compare_pairwise(&tables, Some(only_x.as_slice()), false).unwrap();
        assert!(restricted.comparisons().is_empty());
    }

    #[test]
    fn test_compare_pairwise_needs_two_tables() {
        let tables = vec![("a".to_owned(), table("chr1", &[(0, 10)]))];
        assert_eq!(
            compare_pairwise(&tables, None, false).unwrap_err(),
            Error::TooFewDomainTables
        );
    }
}
