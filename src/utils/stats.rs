//! stats.rs
//!
//! Exact tests on 2x2 contingency tables, computed in log space.

use bio::stats::{LogProb, PHREDProb};
use statrs::function::factorial::ln_binomial;

/// Relative tolerance when comparing table probabilities against the
/// observed one (same as scipy's `fisher_exact`).
const RELATIVE_TOLERANCE: f64 = 1e-7;

/// Terms this far (in natural log units) below the running tail sum are
/// below double precision and end the summation.
const NEGLIGIBLE_LN_TERM: f64 = 40.0;

/// Hypergeometric setup of a 2x2 table `[[a, b], [c, d]]`: the number of
/// "successes" `a` in a sample of size `a + b` drawn from `a + b + c + d`
/// items of which `a + c` are successes.
#[derive(Debug, Clone, Copy)]
struct Hypergeometric {
    row: u64,
    col: u64,
    total: u64,
    ln_norm: f64,
}

impl Hypergeometric {
    fn new(row: u64, col: u64, total: u64) -> Self {
        Hypergeometric {
            row,
            col,
            total,
            ln_norm: ln_binomial(total, row),
        }
    }

    fn support(&self) -> (u64, u64) {
        let lower = (self.row + self.col).saturating_sub(self.total);
        let upper = self.row.min(self.col);
        (lower, upper)
    }

    fn mode(&self) -> u64 {
        let mode = ((self.row as u128 + 1) * (self.col as u128 + 1) / (self.total as u128 + 2)) as u64;
        let (lower, upper) = self.support();
        mode.max(lower).min(upper)
    }

    fn ln_pmf(&self, k: u64) -> f64 {
        ln_binomial(self.col, k) + ln_binomial(self.total - self.col, self.row - k) - self.ln_norm
    }

    /// Sum of the pmf from `start` walking away from the mode
    /// until the support ends or the terms become negligible. The pmf is
    /// monotonically decreasing in that direction.
    fn ln_tail(&self, start: u64, downwards: bool) -> LogProb {
        let (lower, upper) = self.support();
        let mut sum = LogProb::ln_zero();
        let mut k = start;
        loop {
            let term = self.ln_pmf(k);
            if *sum != f64::NEG_INFINITY && term < *sum - NEGLIGIBLE_LN_TERM {
                break;
            }
            sum = sum.ln_add_exp(LogProb(term));
            if downwards {
                if k == lower {
                    break;
                }
                k -= 1;
            } else {
                if k == upper {
                    break;
                }
                k += 1;
            }
        }
        sum
    }

    /// Smallest k in `[from, upper]` with a pmf of at most `threshold`.
    /// The pmf is non-increasing on that range.
    fn first_at_most_above(&self, from: u64, threshold: f64) -> Option<u64> {
        let (_, upper) = self.support();
        if from > upper || self.ln_pmf(upper) > threshold {
            return None;
        }
        let (mut lo, mut hi) = (from, upper);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.ln_pmf(mid) <= threshold {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Some(lo)
    }

    /// Largest k in `[lower, from]` with a pmf of at most `threshold`.
    /// The pmf is non-decreasing on that range.
    fn last_at_most_below(&self, from: u64, threshold: f64) -> Option<u64> {
        let (lower, _) = self.support();
        if from < lower || self.ln_pmf(lower) > threshold {
            return None;
        }
        let (mut lo, mut hi) = (lower, from);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.ln_pmf(mid) <= threshold {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Some(lo)
    }
}

/// Two-sided Fisher exact test of the 2x2 table `[[a, b], [c, d]]`.
///
/// The p-value is the total probability of all tables with the observed
/// margins that are at most as likely as the observed table. Returned in
/// log space, so that very small p-values do not underflow.
pub fn fisher_exact_two_sided(a: u64, b: u64, c: u64, d: u64) -> LogProb {
    let total = a + b + c + d;
    if total == 0 {
        return LogProb::ln_one();
    }
    let dist = Hypergeometric::new(a + b, a + c, total);
    let (lower, upper) = dist.support();
    if lower == upper {
        return LogProb::ln_one();
    }

    let threshold = dist.ln_pmf(a) + RELATIVE_TOLERANCE.ln_1p();
    let mode = dist.mode();

    // The pmf increases up to the mode and decreases afterwards, so the
    // tables at most as likely as the observed one form two tails.
    let (left, right) = if a <= mode {
        let from = if a == mode { mode + 1 } else { mode };
        let right = dist
            .first_at_most_above(from, threshold)
            .map(|k| dist.ln_tail(k, false))
            .unwrap_or_else(LogProb::ln_zero);
        (dist.ln_tail(a, true), right)
    } else {
        let left = dist
            .last_at_most_below(mode, threshold)
            .map(|k| dist.ln_tail(k, true))
            .unwrap_or_else(LogProb::ln_zero);
        (left, dist.ln_tail(a, false))
    };

    left.ln_add_exp(right).cap_numerical_overshoot(1e-6)
}

/// Convert a log-space p-value into a significance score -log10(p).
pub fn significance_score(p: LogProb) -> f64 {
    *PHREDProb::from(p) / 10.0
}
