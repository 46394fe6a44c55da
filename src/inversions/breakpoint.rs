//! Breakpoint centroid estimation and zygosity of a significant region.

use getset::CopyGetters;
use serde_derive::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

use super::significance::Bin;
use crate::utils::optimize::NelderMead;

/// Exponent applied to the bin weights in the centroid objective.
const WEIGHT_EXPONENT: i32 = 6;

/// Minimal ratio of same-diagonal to cross-diagonal quadrant counts for a
/// homozygous call.
const HOMOZYGOUS_RATIO: f64 = 2.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize,
)]
pub enum Zygosity {
    #[strum(serialize = "homozygous")]
    #[serde(rename = "homozygous")]
    Homozygous,
    #[strum(serialize = "heterozygous")]
    #[serde(rename = "heterozygous")]
    Heterozygous,
}

/// Estimated breakpoint in bin coordinates.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Centroid {
    row: f64,
    col: f64,
    zygosity: Zygosity,
    /// False if the optimizer hit its iteration or evaluation cap.
    converged: bool,
    evaluations: usize,
}

/// Estimate the breakpoint of a region with the given member bins and
/// weights. Unless a hard breakpoint is given, the centroid minimizes the
/// sum of distances to all bins, weighted by `weight^6`, starting from the
/// middle of the bounding box.
pub fn estimate(bins: &[Bin], weights: &[f64], hard_break: Option<(usize, usize)>) -> Centroid {
    let (row, col, converged, evaluations) = if let Some((row, col)) = hard_break {
        (row as f64, col as f64, true, 0)
    } else if bins.is_empty() {
        (0.0, 0.0, true, 0)
    } else {
        let rows = bins.iter().map(|bin| bin.row);
        let cols = bins.iter().map(|bin| bin.col);
        let start = [
            (rows.clone().min().unwrap_or(0) + rows.max().unwrap_or(0)) as f64 / 2.0,
            (cols.clone().min().unwrap_or(0) + cols.max().unwrap_or(0)) as f64 / 2.0,
        ];
        let powered: Vec<f64> = weights.iter().map(|w| w.powi(WEIGHT_EXPONENT)).collect();
        let objective = |x: &[f64]| {
            bins.iter()
                .zip(&powered)
                .map(|(bin, w)| {
                    let dr = bin.row as f64 - x[0];
                    let dc = bin.col as f64 - x[1];
                    (dr * dr + dc * dc).sqrt() * w
                })
                .sum::<f64>()
        };
        let minimum = NelderMead::default().minimize(objective, &start);
        (
            minimum.point()[0],
            minimum.point()[1],
            *minimum.converged(),
            *minimum.evaluations(),
        )
    };

    Centroid {
        row,
        col,
        zygosity: zygosity(bins, row, col),
        converged,
        evaluations,
    }
}

/// Classify by the quadrants around `(row, col)`. Bins on a centre line
/// belong to no quadrant.
pub fn zygosity(bins: &[Bin], row: f64, col: f64) -> Zygosity {
    let (mut q1, mut q2, mut q3, mut q4) = (0usize, 0usize, 0usize, 0usize);
    for bin in bins {
        let (r, c) = (bin.row as f64, bin.col as f64);
        if r < row && c < col {
            q2 += 1;
        } else if r > row && c < col {
            q1 += 1;
        } else if r > row && c > col {
            q4 += 1;
        } else if r < row && c > col {
            q3 += 1;
        }
    }
    if (q2 + q4) as f64 / (q1 + q3 + 1) as f64 >= HOMOZYGOUS_RATIO {
        Zygosity::Homozygous
    } else {
        Zygosity::Heterozygous
    }
}
