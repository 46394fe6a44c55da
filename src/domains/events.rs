// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Classification of structural differences between two domain sets.
//!
//! With `c` the composition of the control domains in terms of the test
//! domains and `t` the transposed composition of the test domains in terms
//! of the control domains (both control × test), every cell `(r, k)` is
//! inspected for partial overlaps:
//!
//! * control domain `r` partially covered by the test set: reduction,
//! * control domain `r` split over neighbouring test domains: division,
//! * test domain `k` partially covered by the control set: expansion,
//! * test domain `k` joining neighbouring control domains: merge.
//!
//! Domains without any counterpart are deletions (control) or insertions
//! (test).

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use derive_new::new;
use getset::{CopyGetters, Getters};
use serde_derive::Serialize;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use super::{CompositionMatrix, Domain};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
)]
pub enum EventKind {
    #[strum(serialize = "expansion")]
    Expansion,
    #[strum(serialize = "reduction")]
    Reduction,
    #[strum(serialize = "merge")]
    Merge,
    #[strum(serialize = "division")]
    Division,
    #[strum(serialize = "insertion")]
    Insertion,
    #[strum(serialize = "deletion")]
    Deletion,
}

/// A control domain and a test domain involved in the same event.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DomainPair {
    control: Domain,
    test: Domain,
}

impl fmt::Display for DomainPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.control, self.test)
    }
}

/// Where an event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSite {
    /// A single domain without counterpart.
    Single(Domain),
    /// A partially overlapping control/test domain pair.
    Pair(DomainPair),
    /// Two pairs sharing one domain, adjacent in the other set.
    Adjacent(DomainPair, DomainPair),
}

impl fmt::Display for EventSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventSite::Single(domain) => write!(f, "{}", domain),
            EventSite::Pair(pair) => write!(f, "{}", pair),
            EventSite::Adjacent(a, b) => write!(f, "{},{}", a, b),
        }
    }
}

#[derive(new, Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Event {
    #[getset(get_copy = "pub")]
    kind: EventKind,
    #[getset(get = "pub")]
    site: EventSite,
    #[getset(get_copy = "pub")]
    severity: f64,
}

/// Classified events, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Events {
    inner: BTreeMap<EventKind, Vec<Event>>,
}

impl Events {
    pub fn push(&mut self, event: Event) {
        self.inner.entry(event.kind()).or_insert_with(Vec::new).push(event);
    }

    pub fn get(&self, kind: EventKind) -> &[Event] {
        self.inner.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &[Event])> {
        self.inner.iter().map(|(kind, events)| (*kind, events.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.inner.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `n` most severe events of the given kind. Ties keep their
    /// classification order.
    pub fn top(&self, kind: EventKind, n: usize) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.get(kind).iter().collect();
        events.sort_by(|a, b| b.severity().total_cmp(&a.severity()));
        events.truncate(n);
        events
    }

    /// Remove adjacent events that were already reported for the same
    /// unordered pair of sites, keeping the first.
    pub fn deduplicate(&mut self) {
        for events in self.inner.values_mut() {
            let mut seen = HashSet::new();
            events.retain(|event| match event.site() {
                EventSite::Adjacent(a, b) => seen.insert((*a.min(b), *a.max(b))),
                _ => true,
            });
        }
    }
}

/// Classify the differences between sorted control and test domains from
/// their composition matrices (`control_composition` is control × test,
/// `test_composition` is test × control).
pub fn classify(
    control: &[Domain],
    test: &[Domain],
    control_composition: &CompositionMatrix,
    test_composition: &CompositionMatrix,
) -> Events {
    let c = control_composition.fractions();
    let t = test_composition.fractions().t();
    let (n_control, n_test) = (control.len(), test.len());
    let pair = |r: usize, k: usize| DomainPair::new(control[r], test[k]);
    let mut events = Events::default();

    for k in 0..n_test {
        if test_composition.is_row_empty(k) {
            events.push(Event::new(EventKind::Insertion, EventSite::Single(test[k]), 1.0));
        }
    }

    for r in 0..n_control {
        if control_composition.is_row_empty(r) {
            events.push(Event::new(EventKind::Deletion, EventSite::Single(control[r]), 1.0));
            continue;
        }
        for k in 0..n_test {
            if test_composition.is_row_empty(k) {
                continue;
            }

            let fraction = c[[r, k]];
            if fraction > 0.0 && fraction < 1.0 {
                if !control_composition.is_row_complete(r) {
                    events.push(Event::new(
                        EventKind::Reduction,
                        EventSite::Pair(pair(r, k)),
                        control_composition.boundary()[r],
                    ));
                }
                for neighbour in neighbours(k, n_test) {
                    let other = c[[r, neighbour]];
                    if other != 0.0 {
                        events.push(Event::new(
                            EventKind::Division,
                            EventSite::Adjacent(pair(r, k), pair(r, neighbour)),
                            (other - fraction).abs() * t[[r, k]],
                        ));
                    }
                }
            }

            let fraction = t[[r, k]];
            if fraction > 0.0 && fraction < 1.0 {
                if !test_composition.is_row_complete(k) {
                    events.push(Event::new(
                        EventKind::Expansion,
                        EventSite::Pair(pair(r, k)),
                        test_composition.boundary()[k],
                    ));
                }
                for neighbour in neighbours(r, n_control) {
                    let other = t[[neighbour, k]];
                    if other != 0.0 {
                        events.push(Event::new(
                            EventKind::Merge,
                            EventSite::Adjacent(pair(r, k), pair(neighbour, k)),
                            (other - fraction).abs() * c[[r, k]],
                        ));
                    }
                }
            }
        }
    }

    events
}

/// In-range indices directly before and after `i`.
fn neighbours(i: usize, len: usize) -> impl Iterator<Item = usize> {
    let before = i.checked_sub(1);
    let after = if i + 1 < len { Some(i + 1) } else { None };
    before.into_iter().chain(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn domains(bounds: &[(u64, u64)]) -> Vec<Domain> {
        bounds
            .iter()
            .map(|&(start, end)| Domain::new(start, end).unwrap())
            .collect()
    }

    fn classify_sets(control: &[(u64, u64)], test: &[(u64, u64)]) -> Events {
        let control = domains(control);
        let test = domains(test);
        classify(
            &control,
            &test,
            &CompositionMatrix::build(&control, &test),
            &CompositionMatrix::build(&test, &control),
        )
    }

    #[test]
    fn test_identical_sets() {
        let events = classify_sets(&[(0, 10), (10, 20)], &[(0, 10), (10, 20)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_insertion_and_deletion() {
        let events = classify_sets(&[(0, 10), (100, 200)], &[(0, 10), (300, 400)]);
        let deletions = events.get(EventKind::Deletion);
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].site(), &EventSite::Single(Domain::new(100, 200).unwrap()));
        assert_relative_eq!(deletions[0].severity(), 1.0);
        let insertions = events.get(EventKind::Insertion);
        assert_eq!(insertions.len(), 1);
        assert_eq!(insertions[0].site(), &EventSite::Single(Domain::new(300, 400).unwrap()));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_insertion_reported_when_all_control_domains_are_deleted() {
        let events = classify_sets(&[(0, 10)], &[(50, 60), (60, 70)]);
        assert_eq!(events.get(EventKind::Deletion).len(), 1);
        assert_eq!(events.get(EventKind::Insertion).len(), 2);
    }

    #[test]
    fn test_division() {
        // control domain split in two test domains
        let events = classify_sets(&[(0, 100)], &[(0, 30), (30, 100)]);
        let divisions = events.get(EventKind::Division);
        assert_eq!(divisions.len(), 2);
        // c = [0.3, 0.7], t = [1, 1]
        assert_relative_eq!(divisions[0].severity(), 0.4, epsilon = 1e-12);
        assert_eq!(
            divisions[0].site().to_string(),
            "0-100/0-30,0-100/30-100"
        );
        assert!(events.get(EventKind::Reduction).is_empty());
        assert!(events.get(EventKind::Merge).is_empty());
    }

    #[test]
    fn test_merge_and_expansion() {
        // test domain spans two control domains and more
        let events = classify_sets(&[(0, 40), (40, 80)], &[(0, 100)]);
        let merges = events.get(EventKind::Merge);
        assert_eq!(merges.len(), 2);
        assert_relative_eq!(merges[0].severity(), 0.0, epsilon = 1e-12);
        let expansions = events.get(EventKind::Expansion);
        assert_eq!(expansions.len(), 2);
        assert_relative_eq!(expansions[0].severity(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_reduction() {
        let events = classify_sets(&[(0, 100)], &[(0, 50), (70, 100)]);
        let reductions = events.get(EventKind::Reduction);
        assert_eq!(reductions.len(), 2);
        assert_relative_eq!(reductions[0].severity(), 0.2, epsilon = 1e-12);
        assert!(reductions.iter().all(|e| e.severity() >= 0.0));
    }

    #[test]
    fn test_deduplicate_keeps_first_of_reciprocal_pair() {
        let mut events = classify_sets(&[(0, 100)], &[(0, 30), (30, 100)]);
        assert_eq!(events.get(EventKind::Division).len(), 2);
        events.deduplicate();
        let divisions = events.get(EventKind::Division);
        assert_eq!(divisions.len(), 1);
        assert_eq!(
            divisions[0].site().to_string(),
            "0-100/0-30,0-100/30-100"
        );
    }

    #[test]
    fn test_top_events() {
        let mut events = Events::default();
        let site = EventSite::Single(Domain::new(0, 1).unwrap());
        for severity in &[0.2, 0.9, 0.5, 0.9] {
            events.push(Event::new(EventKind::Reduction, site, *severity));
        }
        let top = events.top(EventKind::Reduction, 3);
        let severities: Vec<f64> = top.iter().map(|e| e.severity()).collect();
        assert_eq!(severities, vec![0.9, 0.9, 0.5]);
        assert!(events.top(EventKind::Merge, 3).is_empty());
    }

    #[test]
    fn test_event_kind_strings() {
        assert_eq!(EventKind::Division.to_string(), "division");
        assert_eq!(EventKind::from_str("merge").unwrap(), EventKind::Merge);
    }
}
