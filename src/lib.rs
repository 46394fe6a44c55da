// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod cli;
pub mod contacts;
pub mod domains;
pub mod errors;
pub mod inversions;
pub mod utils;

pub use crate::contacts::{ContactBinner, ContactBinnerBuilder, ContactMatrix, ContactTable};
pub use crate::domains::{compare_pairwise, Comparison, Domain, DomainTable, EventKind, Events};
pub use crate::inversions::{BreakpointPrediction, Caller, CallerBuilder, Zygosity};
