//! Nelder-Mead direct search.
//!
//! Standard coefficients (reflection 1, expansion 2, contraction 1/2,
//! shrink 1/2). A pass ends when the spread of objective values across the
//! simplex falls under the tolerance or the iteration budget is spent; the
//! search then restarts from the best vertex with a fresh simplex, which
//! recovers from premature collapse along one axis. All passes draw on one
//! shared iteration budget. Non-finite objective
//! values are treated as `+inf` so the simplex moves away from them.

/// Nelder-Mead configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimplexConfig {
    /// Iteration budget shared by all passes.
    pub max_iterations: usize,
    /// Relative tolerance on the objective spread.
    pub rel_tolerance: f64,
    /// Absolute tolerance on the objective spread.
    pub abs_tolerance: f64,
    /// Extra passes started from the best vertex.
    pub restarts: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            rel_tolerance: 1e-10,
            abs_tolerance: 1e-12,
            restarts: 2,
        }
    }
}

/// Outcome of a Nelder-Mead search.
#[derive(Clone, Debug, PartialEq)]
pub struct SimplexResult {
    /// Best point found.
    pub point: Vec<f64>,
    /// Objective value at `point`.
    pub value: f64,
    /// Iterations summed over all passes.
    pub iterations: usize,
    /// True when the last pass met the tolerance before its budget ran out.
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimizes `objective` starting from `start` with initial edge lengths
/// `steps` (one per coordinate).
pub fn minimize<F>(objective: F, start: &[f64], steps: &[f64], cfg: &SimplexConfig) -> SimplexResult
where
    F: Fn(&[f64]) -> f64,
{
    let eval = |p: &[f64]| {
        let v = objective(p);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let mut best = start.to_vec();
    let mut best_value = eval(&best);
    let mut iterations = 0;
    let mut converged = false;

    for pass in 0..=cfg.restarts {
        let budget = cfg.max_iterations - iterations;
        if pass > 0 && budget == 0 {
            break;
        }
        let (point, value, used, pass_converged) =
            run_pass(&eval, &best, best_value, steps, budget, cfg);
        iterations += used;
        converged = pass_converged;
        let improvement = best_value - value;
        if value <= best_value {
            best = point;
            best_value = value;
        }
        let settled = improvement.abs()
            <= cfg.rel_tolerance * best_value.abs() + cfg.abs_tolerance;
        if pass > 0 && settled {
            break;
        }
    }

    SimplexResult {
        point: best,
        value: best_value,
        iterations,
        converged,
    }
}

fn run_pass<F>(
    eval: &F,
    start: &[f64],
    start_value: f64,
    steps: &[f64],
    budget: usize,
    cfg: &SimplexConfig,
) -> (Vec<f64>, f64, usize, bool)
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut values: Vec<f64> = Vec::with_capacity(n + 1);
    vertices.push(start.to_vec());
    values.push(start_value);
    for i in 0..n {
        let mut v = start.to_vec();
        v[i] += steps.get(i).copied().unwrap_or(1.0);
        values.push(eval(&v));
        vertices.push(v);
    }

    let mut order: Vec<usize> = (0..=n).collect();
    let mut centroid = vec![0.0f64; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < budget {
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n.saturating_sub(1)];

        let (f_best, f_worst) = (values[best], values[worst]);
        let spread = (f_worst - f_best).abs();
        if f_worst.is_finite()
            && spread <= cfg.rel_tolerance * (f_best.abs() + f_worst.abs()) + cfg.abs_tolerance
        {
            converged = true;
            break;
        }
        iterations += 1;

        centroid.fill(0.0);
        for &idx in order.iter().take(n) {
            for (c, &v) in centroid.iter_mut().zip(&vertices[idx]) {
                *c += v;
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f64;
        }

        let reflected = along(&centroid, &vertices[worst], -REFLECT);
        let f_reflected = eval(&reflected);

        if f_reflected < f_best {
            let expanded = along(&centroid, &vertices[worst], -REFLECT * EXPAND);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                vertices[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                vertices[worst] = reflected;
                values[worst] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[second_worst] {
            vertices[worst] = reflected;
            values[worst] = f_reflected;
            continue;
        }

        let (contracted, f_contracted, accept) = if f_reflected < f_worst {
            let c = along(&centroid, &vertices[worst], -REFLECT * CONTRACT);
            let f = eval(&c);
            (c, f, f <= f_reflected)
        } else {
            let c = along(&centroid, &vertices[worst], CONTRACT);
            let f = eval(&c);
            (c, f, f < f_worst)
        };
        if accept {
            vertices[worst] = contracted;
            values[worst] = f_contracted;
            continue;
        }

        let anchor = vertices[best].clone();
        for idx in 0..=n {
            if idx == best {
                continue;
            }
            for (v, &a) in vertices[idx].iter_mut().zip(&anchor) {
                *v = a + SHRINK * (*v - a);
            }
            values[idx] = eval(&vertices[idx]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    (vertices.swap_remove(best), values[best], iterations, converged)
}

/// Returns `centroid + t * (vertex - centroid)`.
fn along(centroid: &[f64], vertex: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(vertex)
        .map(|(&c, &v)| c + t * (v - c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{minimize, SimplexConfig};

    #[test]
    fn minimizes_shifted_quadratic() {
        let f = |p: &[f64]| (p[0] - 3.0).powi(2) + 2.0 * (p[1] + 1.0).powi(2) + 5.0;
        let res = minimize(f, &[0.0, 0.0], &[1.0, 1.0], &SimplexConfig::default());
        assert!((res.point[0] - 3.0).abs() < 1e-4);
        assert!((res.point[1] + 1.0).abs() < 1e-4);
        assert!((res.value - 5.0).abs() < 1e-8);
        assert!(res.converged);
    }

    #[test]
    fn minimizes_rosenbrock() {
        let f = |p: &[f64]| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2);
        let cfg = SimplexConfig {
            max_iterations: 5000,
            ..SimplexConfig::default()
        };
        let res = minimize(f, &[-1.2, 1.0], &[0.5, 0.5], &cfg);
        assert!((res.point[0] - 1.0).abs() < 1e-3);
        assert!((res.point[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn nan_regions_are_avoided() {
        let f = |p: &[f64]| {
            if p[0] < 0.0 {
                f64::NAN
            } else {
                (p[0] - 2.0).powi(2)
            }
        };
        let res = minimize(f, &[0.5], &[0.3], &SimplexConfig::default());
        assert!((res.point[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn restarts_share_the_iteration_budget() {
        let f = |p: &[f64]| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2);
        let cfg = SimplexConfig {
            max_iterations: 25,
            restarts: 4,
            ..SimplexConfig::default()
        };
        let res = minimize(f, &[-1.2, 1.0], &[0.5, 0.5], &cfg);
        assert!(res.iterations <= 25, "{} iterations", res.iterations);
        assert!(!res.converged);
    }
}
