//! Bounded, derivative free global minimization by dual annealing: generalized simulated
//! annealing with a Cauchy-Lorentz like visiting distribution, combined with
//! Nelder-Mead simplex descent applied to promising points.
//!
//! The search stops early as soon as any evaluation gets below the target value given
//! by the caller, so the cost function does not need to signal anything itself.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{debug, trace};

use crate::kinematics_error::{check_length, KinematicsError};
use crate::parameters::solver::SolverParameters;
use crate::utils::{clamp, map_range};

/// Visits beyond this distance are replaced by a random value within it.
const TAIL_LIMIT: f64 = 1e8;

/// Minimal distance from the lower bound for a visited point.
const MIN_VISIT_BOUND: f64 = 1e-10;

/// Number of attempts to find a random start with finite cost.
const MAX_REINIT_COUNT: usize = 1000;

/// Outcome of the minimization. Not reaching the target is not an error, the best
/// point found is still returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    /// Value got below the target, the search stopped early.
    pub reached_target: bool,
    /// Search was cancelled by the stop flag.
    pub cancelled: bool,
}

/// Wraps the cost function, counts evaluations and keeps the best point found.
struct Objective<'a, F> {
    cost: F,
    evaluations: usize,
    max_evaluations: usize,
    target: f64,
    stop: Option<&'a AtomicBool>,
    best_x: Vec<f64>,
    best_value: f64,
}

impl<F: FnMut(&[f64]) -> f64> Objective<'_, F> {
    fn eval(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = (self.cost)(x);
        trace!("evaluation {}: {:e} at {:?}", self.evaluations, value, x);
        if value < self.best_value {
            self.best_value = value;
            self.best_x = x.to_vec();
        }
        value
    }

    fn reached_target(&self) -> bool {
        self.best_value < self.target
    }

    fn cancelled(&self) -> bool {
        self.stop.is_some_and(|stop| stop.load(Ordering::Relaxed))
    }

    /// Checked after every evaluation.
    fn done(&self) -> bool {
        self.reached_target() || self.evaluations >= self.max_evaluations || self.cancelled()
    }
}

/// Rectangular search region.
struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    fn range(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    fn clip(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            *v = clamp(*v, self.lower[i], self.upper[i]);
        }
    }

    fn contains(&self, x: &[f64]) -> bool {
        x.iter().enumerate().all(|(i, &v)| v >= self.lower[i] && v <= self.upper[i])
    }

    /// Wraps the coordinate back into the bounds as if the range was periodic.
    fn wrap(&self, i: usize, v: f64) -> f64 {
        let range = self.range(i);
        if range <= 0.0 {
            return self.lower[i];
        }
        let a = v - self.lower[i];
        let b = a % range + range;
        let mut wrapped = b % range + self.lower[i];
        if (wrapped - self.lower[i]).abs() < MIN_VISIT_BOUND {
            wrapped += MIN_VISIT_BOUND;
        }
        wrapped
    }

    fn random_point(&self, rng: &mut StdRng) -> Vec<f64> {
        (0..self.lower.len())
            .map(|i| map_range(0.0, 1.0, self.lower[i], self.upper[i], rng.gen_range(0.0..1.0)))
            .collect()
    }
}

/// Generalized visiting distribution of the annealing (Tsallis statistics).
#[derive(Debug)]
struct VisitingDistribution {
    visit: f64,
    factor4_p: f64,
    factor6: f64,
}

impl VisitingDistribution {
    fn new(visit: f64) -> Self {
        let qv = visit;
        let factor2 = ((4.0 - qv) * (qv - 1.0).ln()).exp();
        let factor3 = ((2.0 - qv) * 2.0_f64.ln() / (qv - 1.0)).exp();
        let factor4_p = PI.sqrt() * factor2 / (factor3 * (3.0 - qv));
        let factor5 = 1.0 / (qv - 1.0) - 0.5;
        let d1 = 2.0 - factor5;
        let factor6 = PI * (1.0 - factor5) / (PI * (1.0 - factor5)).sin() / ln_gamma(d1).exp();
        VisitingDistribution { visit, factor4_p, factor6 }
    }

    /// Random step of the given dimension at the given temperature.
    fn sample(&self, rng: &mut StdRng, temperature: f64, dim: usize) -> Vec<f64> {
        let qv = self.visit;
        let factor1 = (temperature.ln() / (qv - 1.0)).exp();
        let factor4 = self.factor4_p * factor1;
        let sigma = (-(qv - 1.0) * (self.factor6 / factor4).ln() / (3.0 - qv)).exp();

        (0..dim)
            .map(|_| {
                let x: f64 = rng.sample(StandardNormal);
                let y: f64 = rng.sample(StandardNormal);
                let den = ((qv - 1.0) * y.abs().ln() / (3.0 - qv)).exp();
                sigma * x / den
            })
            .collect()
    }

    /// Point visited from `x` in the given step of the strategy chain. The first `dim`
    /// steps move all coordinates, the following `dim` steps one coordinate each.
    fn visiting(&self, rng: &mut StdRng, bounds: &Bounds, x: &[f64], step: usize, temperature: f64) -> Vec<f64> {
        let dim = x.len();
        if step < dim {
            let mut visits = self.sample(rng, temperature, dim);
            let upper_sample: f64 = rng.gen_range(0.0..1.0);
            let lower_sample: f64 = rng.gen_range(0.0..1.0);
            for v in visits.iter_mut() {
                if *v > TAIL_LIMIT {
                    *v = TAIL_LIMIT * upper_sample;
                } else if *v < -TAIL_LIMIT {
                    *v = -TAIL_LIMIT * lower_sample;
                }
            }
            (0..dim).map(|i| bounds.wrap(i, visits[i] + x[i])).collect()
        } else {
            let mut visited = x.to_vec();
            let mut visit = self.sample(rng, temperature, 1)[0];
            if visit > TAIL_LIMIT {
                visit = TAIL_LIMIT * rng.gen_range(0.0..1.0);
            } else if visit < -TAIL_LIMIT {
                visit = -TAIL_LIMIT * rng.gen_range(0.0..1.0);
            }
            let index = step - dim;
            visited[index] = bounds.wrap(index, visit + x[index]);
            visited
        }
    }
}

/// Natural logarithm of the gamma function (Lanczos approximation, g = 7).
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEFFICIENTS[0];
    let t = x + G + 0.5;
    for (i, c) in COEFFICIENTS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Current state of the annealing walk.
struct EnergyState {
    current_x: Vec<f64>,
    current_value: f64,
    best_x: Vec<f64>,
    best_value: f64,
}

impl EnergyState {
    /// Starts from `x0` if given, otherwise from a random point with finite cost.
    fn reset<F: FnMut(&[f64]) -> f64>(
        objective: &mut Objective<F>,
        bounds: &Bounds,
        rng: &mut StdRng,
        x0: Option<&[f64]>,
    ) -> (Vec<f64>, f64) {
        let mut x = match x0 {
            Some(x0) => x0.to_vec(),
            None => bounds.random_point(rng),
        };
        let mut value = objective.eval(&x);
        let mut attempts = 0;
        while !value.is_finite() && attempts < MAX_REINIT_COUNT && !objective.done() {
            x = bounds.random_point(rng);
            value = objective.eval(&x);
            attempts += 1;
        }
        (x, value)
    }
}

/// Dual annealing minimizer configured by [`SolverParameters`].
#[derive(Debug, Clone, Copy)]
pub struct DualAnnealing {
    pub parameters: SolverParameters,
}

impl DualAnnealing {
    pub fn new(parameters: SolverParameters) -> Self {
        DualAnnealing { parameters }
    }

    /// Minimizes `cost` within `[lower, upper]` starting from `x0`. Stops as soon as the
    /// cost gets below `target`, when the iteration or evaluation budget is exhausted, or
    /// when `stop` is raised. The best point seen is returned in every case.
    ///
    /// Fails if the bounds and the start point differ in length or the parameters do
    /// not pass [`SolverParameters::validate`]. Nothing is evaluated then.
    pub fn minimize<F>(
        &self,
        cost: F,
        lower: &[f64],
        upper: &[f64],
        x0: &[f64],
        target: f64,
        stop: Option<&AtomicBool>,
    ) -> Result<Minimum, KinematicsError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        check_length(x0.len(), lower.len())?;
        check_length(x0.len(), upper.len())?;
        self.parameters.validate()?;
        let p = &self.parameters;
        let bounds = Bounds { lower: lower.to_vec(), upper: upper.to_vec() };
        let dim = x0.len();
        let mut rng = StdRng::seed_from_u64(p.seed);
        let visiting = VisitingDistribution::new(p.visit);
        let mut objective = Objective {
            cost,
            evaluations: 0,
            max_evaluations: p.max_evaluations,
            target,
            stop,
            best_x: x0.to_vec(),
            best_value: f64::INFINITY,
        };

        let (x, value) = EnergyState::reset(&mut objective, &bounds, &mut rng, Some(x0));
        let mut state = EnergyState {
            current_x: x.clone(),
            current_value: value,
            best_x: x,
            best_value: value,
        };

        if dim > 0 && !objective.done() {
            let mut chain = StrategyChain {
                visiting: &visiting,
                bounds: &bounds,
                accept: p.accept,
                use_local_search: p.local_search,
                not_improved: 0,
                not_improved_max: 1000,
                improved: false,
                temperature_step: 0.0,
                x_min: state.current_x.clone(),
                e_min: state.current_value,
            };
            self.run(&mut chain, &mut state, &mut objective, &mut rng);
        }

        debug!(
            "Dual annealing finished after {} evaluations, best {:e}",
            objective.evaluations, objective.best_value
        );
        Ok(Minimum {
            reached_target: objective.reached_target(),
            cancelled: objective.cancelled(),
            evaluations: objective.evaluations,
            x: objective.best_x,
            value: objective.best_value,
        })
    }

    fn run<F: FnMut(&[f64]) -> f64>(
        &self,
        chain: &mut StrategyChain,
        state: &mut EnergyState,
        objective: &mut Objective<F>,
        rng: &mut StdRng,
    ) {
        let p = &self.parameters;
        let restart_temperature = p.initial_temperature * p.restart_temperature_ratio;
        let t1 = ((p.visit - 1.0) * 2.0_f64.ln()).exp() - 1.0;
        let mut iteration = 0;

        'restart: loop {
            for i in 0..p.max_iterations {
                if iteration >= p.max_iterations {
                    break 'restart;
                }
                let s = i as f64 + 2.0;
                let t2 = ((p.visit - 1.0) * s.ln()).exp() - 1.0;
                let temperature = p.initial_temperature * t1 / t2;

                if temperature < restart_temperature {
                    debug!("Annealing restart at iteration {}", iteration);
                    let (x, value) = EnergyState::reset(objective, chain.bounds, rng, None);
                    state.current_x = x;
                    state.current_value = value;
                    // Restarting before the first step would never advance the iteration
                    if objective.done() || i == 0 {
                        break 'restart;
                    }
                    continue 'restart;
                }

                if chain.run(i, temperature, state, objective, rng) {
                    break 'restart;
                }
                if chain.use_local_search && chain.local_search(state, objective) {
                    break 'restart;
                }
                iteration += 1;
            }
            if iteration >= p.max_iterations || p.max_iterations == 0 {
                break;
            }
        }
    }
}

/// One iteration of the annealing walk: `2 * dim` visits, then optional local search.
struct StrategyChain<'a> {
    visiting: &'a VisitingDistribution,
    bounds: &'a Bounds,
    accept: f64,
    use_local_search: bool,
    not_improved: usize,
    not_improved_max: usize,
    improved: bool,
    temperature_step: f64,
    x_min: Vec<f64>,
    e_min: f64,
}

impl StrategyChain<'_> {
    /// Returns true if the search must stop.
    fn run<F: FnMut(&[f64]) -> f64>(
        &mut self,
        step: usize,
        temperature: f64,
        state: &mut EnergyState,
        objective: &mut Objective<F>,
        rng: &mut StdRng,
    ) -> bool {
        self.temperature_step = temperature / (step + 1) as f64;
        self.not_improved += 1;
        self.improved = step == 0;

        for j in 0..state.current_x.len() * 2 {
            let x_visit = self.visiting.visiting(rng, self.bounds, &state.current_x, j, temperature);
            let e = objective.eval(&x_visit);
            if objective.done() {
                return true;
            }
            if e < state.current_value {
                state.current_value = e;
                state.current_x = x_visit.clone();
                if e < state.best_value {
                    state.best_value = e;
                    state.best_x = x_visit;
                    self.improved = true;
                    self.not_improved = 0;
                }
            } else {
                self.accept_reject(j, e, x_visit, state, rng);
            }
        }
        false
    }

    /// Metropolis-like acceptance of a worse point.
    fn accept_reject(&mut self, j: usize, e: f64, x_visit: Vec<f64>, state: &mut EnergyState, rng: &mut StdRng) {
        let r: f64 = rng.gen_range(0.0..1.0);
        let pqv_temp = 1.0 - (1.0 - self.accept) * (e - state.current_value) / self.temperature_step;
        let pqv = if pqv_temp <= 0.0 {
            0.0
        } else {
            (pqv_temp.ln() / (1.0 - self.accept)).exp()
        };
        if r <= pqv {
            state.current_value = e;
            state.current_x = x_visit;
            self.x_min = state.current_x.clone();
        }

        // No improvement for a long time
        if self.not_improved >= self.not_improved_max && (j == 0 || state.current_value < self.e_min) {
            self.e_min = state.current_value;
            self.x_min = state.current_x.clone();
        }
    }

    /// Returns true if the search must stop.
    fn local_search<F: FnMut(&[f64]) -> f64>(&mut self, state: &mut EnergyState, objective: &mut Objective<F>) -> bool {
        if self.improved {
            let (e, x) = nelder_mead(objective, self.bounds, &state.best_x, state.best_value);
            if objective.done() {
                return true;
            }
            if e < state.best_value {
                self.not_improved = 0;
                state.best_value = e;
                state.best_x = x.clone();
                state.current_value = e;
                state.current_x = x;
            }
        }

        if self.not_improved >= self.not_improved_max {
            let (e, x) = nelder_mead(objective, self.bounds, &self.x_min, self.e_min);
            if objective.done() {
                return true;
            }
            self.x_min = x.clone();
            self.e_min = e;
            self.not_improved = 0;
            self.not_improved_max = state.current_x.len();
            if e < state.best_value {
                state.best_value = e;
                state.best_x = x.clone();
                state.current_value = e;
                state.current_x = x;
            }
        }
        false
    }
}

/// Nelder-Mead simplex descent from `x0` with known value `e0`, clipped to the bounds.
/// Returns the improved point, or the starting one if nothing better was found.
fn nelder_mead<F: FnMut(&[f64]) -> f64>(
    objective: &mut Objective<F>,
    bounds: &Bounds,
    x0: &[f64],
    e0: f64,
) -> (f64, Vec<f64>) {
    const RHO: f64 = 1.0;
    const CHI: f64 = 2.0;
    const PSI: f64 = 0.5;
    const SIGMA: f64 = 0.5;
    const NONZERO_DELTA: f64 = 0.05;
    const ZERO_DELTA: f64 = 0.00025;
    const X_TOLERANCE: f64 = 1e-4;
    const F_TOLERANCE: f64 = 1e-4;

    let n = x0.len();
    let max_iterations = (n * 6).clamp(100, 1000);

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut start = x0.to_vec();
    bounds.clip(&mut start);
    simplex.push(start);
    for k in 0..n {
        let mut y = simplex[0].clone();
        if y[k] != 0.0 {
            y[k] *= 1.0 + NONZERO_DELTA;
        } else {
            y[k] = ZERO_DELTA;
        }
        bounds.clip(&mut y);
        simplex.push(y);
    }

    let mut values = Vec::with_capacity(n + 1);
    for x in &simplex {
        values.push(objective.eval(x));
        if objective.done() {
            return (e0, x0.to_vec());
        }
    }

    let evaluate = |objective: &mut Objective<F>, x: &mut Vec<f64>| -> Option<f64> {
        bounds.clip(x);
        let value = objective.eval(x);
        (!objective.done()).then_some(value)
    };

    for _ in 0..max_iterations {
        sort_simplex(&mut simplex, &mut values);

        let spread_x = simplex[1..]
            .iter()
            .flat_map(|x| x.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let spread_f = values[1..].iter().map(|v| (v - values[0]).abs()).fold(0.0, f64::max);
        if spread_x <= X_TOLERANCE && spread_f <= F_TOLERANCE {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|i| simplex[..n].iter().map(|x| x[i]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid.iter().zip(&worst).map(|(c, w)| c + t * (c - w)).collect()
        };

        let mut reflected = along(RHO);
        let Some(f_reflected) = evaluate(objective, &mut reflected) else { break };

        let mut shrink = false;
        if f_reflected < values[0] {
            let mut expanded = along(RHO * CHI);
            let Some(f_expanded) = evaluate(objective, &mut expanded) else { break };
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
            let mut contracted = along(PSI * RHO);
            let Some(f_contracted) = evaluate(objective, &mut contracted) else { break };
            if f_contracted <= f_reflected {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                shrink = true;
            }
        } else {
            let mut contracted = along(-PSI);
            let Some(f_contracted) = evaluate(objective, &mut contracted) else { break };
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
                let mut moved: Vec<f64> = best
                    .iter()
                    .zip(&simplex[j])
                    .map(|(b, x)| b + SIGMA * (x - b))
                    .collect();
                let Some(value) = evaluate(objective, &mut moved) else {
                    return best_of(objective, x0, e0);
                };
                simplex[j] = moved;
                values[j] = value;
            }
        }
    }

    if objective.done() {
        return best_of(objective, x0, e0);
    }
    sort_simplex(&mut simplex, &mut values);
    let x = simplex.swap_remove(0);
    if values[0].is_finite() && values[0] < e0 && bounds.contains(&x) {
        (values[0], x)
    } else {
        (e0, x0.to_vec())
    }
}

/// The best point of the objective if it improves on the start.
fn best_of<F>(objective: &Objective<F>, x0: &[f64], e0: f64) -> (f64, Vec<f64>) {
    if objective.best_value < e0 {
        (objective.best_value, objective.best_x.clone())
    } else {
        (e0, x0.to_vec())
    }
}

fn sort_simplex(simplex: &mut Vec<Vec<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}
