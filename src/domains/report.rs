//! Tabular report of the most severe domain events.

use std::io::Write;

use anyhow::Result;
use serde_derive::Serialize;
use strum::IntoEnumIterator;

use super::{EventKind, LabeledComparison};

#[derive(Serialize, Debug)]
struct EventRecord<'a> {
    control: &'a str,
    test: &'a str,
    contig: &'a str,
    event: &'static str,
    site: String,
    severity: f64,
}

/// Write the `n` most severe events per comparison and event kind as
/// tab-separated table.
pub fn write_top_events<W: Write>(
    sink: W,
    comparisons: &[LabeledComparison],
    n: usize,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(sink);
    writer.write_record(&["control", "test", "contig", "event", "site", "severity"])?;
    for labeled in comparisons {
        let comparison = labeled.comparison();
        for kind in EventKind::iter() {
            for event in comparison.events().top(kind, n) {
                writer.serialize(EventRecord {
                    control: labeled.control_label(),
                    test: labeled.test_label(),
                    contig: comparison.contig(),
                    event: kind.into(),
                    site: event.site().to_string(),
                    severity: event.severity(),
                })?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{compare_pairwise, Domain, DomainTable};

    #[test]
    fn test_write_top_events() {
        let mut a = DomainTable::new();
        a.insert(
            "chr1".to_owned(),
            vec![Domain::new(0, 100).unwrap()],
        );
        let mut b = DomainTable::new();
        b.insert(
            "chr1".to_owned(),
            vec![Domain::new(0, 30).unwrap(), Domain::new(30, 100).unwrap()],
        );
        let tables = vec![("a".to_owned(), a), ("b".to_owned(), b)];
        let result = compare_pairwise(&tables, None, true).unwrap();

        let mut out = Vec::new();
        write_top_events(&mut out, &result.comparisons()[..1], 5).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "control\ttest\tcontig\tevent\tsite\tseverity");
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(
            &fields[..5],
            &["a", "b", "chr1", "division", "0-100/0-30,0-100/30-100"]
        );
        assert_relative_eq!(fields[5].parse::<f64>().unwrap(), 0.4, epsilon = 1e-12);
    }
}
