//! optimize.rs
//!
//! Derivative-free minimization with the Nelder–Mead simplex method.

use std::cell::Cell;

use getset::Getters;
use ordered_float::OrderedFloat;

/// Result of a minimization. If `converged` is false, `point` is the best
/// point seen before the iteration or evaluation cap was hit.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Minimum {
    point: Vec<f64>,
    value: f64,
    evaluations: usize,
    iterations: usize,
    converged: bool,
}

/// Nelder–Mead configuration. The defaults use the standard reflection,
/// expansion, contraction and shrink coefficients.
#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iterations: usize,
    pub max_evaluations: usize,
    pub xatol: f64,
    pub fatol: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        NelderMead {
            max_iterations: 5000,
            max_evaluations: 5000,
            xatol: 1e-4,
            fatol: 1e-4,
        }
    }
}

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;
const NONZDELT: f64 = 0.05;
const ZDELT: f64 = 0.00025;

/// `(1 + t) * a - t * b`, componentwise.
fn affine(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(a, b)| (1.0 + t) * a - t * b)
        .collect()
}

impl NelderMead {
    pub fn minimize<F>(&self, mut objective: F, start: &[f64]) -> Minimum
    where
        F: FnMut(&[f64]) -> f64,
    {
        let n = start.len();
        let evaluations = Cell::new(0);
        let mut eval = |x: &[f64]| {
            evaluations.set(evaluations.get() + 1);
            objective(x)
        };

        let mut simplex = vec![start.to_vec()];
        for k in 0..n {
            let mut vertex = start.to_vec();
            vertex[k] = if vertex[k] != 0.0 {
                (1.0 + NONZDELT) * vertex[k]
            } else {
                ZDELT
            };
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();
        sort_simplex(&mut simplex, &mut values);

        let mut iterations = 1;
        while evaluations.get() < self.max_evaluations && iterations < self.max_iterations {
            let best = &simplex[0];
            let x_spread = simplex[1..]
                .iter()
                .flat_map(|x| x.iter().zip(best).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            let f_spread = values[1..]
                .iter()
                .map(|v| (v - values[0]).abs())
                .fold(0.0, f64::max);
            if x_spread <= self.xatol && f_spread <= self.fatol {
                break;
            }

            let worst = simplex[n].clone();
            let centroid: Vec<f64> = (0..n)
                .map(|d| simplex[..n].iter().map(|x| x[d]).sum::<f64>() / n as f64)
                .collect();

            let reflected = affine(&centroid, &worst, RHO);
            let f_reflected = eval(&reflected);
            let mut shrink = false;

            if f_reflected < values[0] {
                let expanded = affine(&centroid, &worst, RHO * CHI);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
            } else if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
            } else if f_reflected < values[n] {
                let contracted = affine(&centroid, &worst, PSI * RHO);
                let f_contracted = eval(&contracted);
                if f_contracted <= f_reflected {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    shrink = true;
                }
            } else {
                let contracted = affine(&centroid, &worst, -PSI);
                let f_contracted = eval(&contracted);
                if f_contracted < values[n] {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].clone();
                for j in 1..=n {
                    simplex[j] = simplex[j]
                        .iter()
                        .zip(&best)
                        .map(|(x, b)| b + SIGMA * (x - b))
                        .collect();
                    values[j] = eval(&simplex[j]);
                }
            }

            sort_simplex(&mut simplex, &mut values);
            iterations += 1;
        }

        let evaluations = evaluations.get();
        let converged = evaluations < self.max_evaluations && iterations < self.max_iterations;
        Minimum {
            point: simplex.swap_remove(0),
            value: values[0],
            evaluations,
            iterations,
            converged,
        }
    }
}

fn sort_simplex(simplex: &mut Vec<Vec<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(values[i]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}
