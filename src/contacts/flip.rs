//! Reverting predicted inversions in contact coordinates.

use super::ContactPair;

/// Undo an inversion of the segment `(start, end)`. Positions strictly
/// inside are mirrored to `start + end - pos` when the other end of the
/// contact lies strictly inside as well, or strictly beyond the segment on
/// the opposite side. Contacts with an end exactly on a breakpoint are kept.
/// The orientation of every pair is preserved.
pub fn revert_inversion(pairs: &mut [ContactPair], start: u64, end: u64) {
    let inside = |pos: u64| pos > start && pos < end;
    let mirror = |pos: u64| start + end - pos;
    for pair in pairs.iter_mut() {
        let ordered = pair.0 <= pair.1;
        let (lo, hi) = if ordered { *pair } else { (pair.1, pair.0) };
        let (lo, hi) = match (inside(lo), inside(hi)) {
            (true, true) => (mirror(lo), mirror(hi)),
            (true, false) if hi > end => (mirror(lo), hi),
            (false, true) if lo < start => (lo, mirror(hi)),
            _ => (lo, hi),
        };
        *pair = if ordered { (lo, hi) } else { (hi, lo) };
    }
}
