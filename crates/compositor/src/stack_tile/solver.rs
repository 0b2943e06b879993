//! Linear layout specification and its solver.
//!
//! Variables are tab positions. Hard constraints bound differences of two
//! variables (or one variable) with `<=`, `>=` or `=`; soft preferences ask a
//! difference to equal a target and are weighed in a least-squares objective.
//! Every variable is also pulled gently towards its previous value so the
//! optimum is unique.
//!
//! Solving runs in two phases:
//!
//! 1. Feasibility: the hard constraints form a difference-constraint graph.
//!    Bellman-Ford from the previous values either finds a feasible point or a
//!    negative cycle, which means the layout is infeasible.
//! 2. Optimisation: a primal active-set method over the quadratic objective,
//!    starting from the feasible point. Each iteration solves one KKT system.
//!    When the iteration cap is hit, the current iterate is feasible and is
//!    accepted as is.

use crate::error::{CompositorError, Result};

/// Index of a variable.
pub type Var = usize;

const EPSILON: f64 = 1e-9;

// ============================================================================
// Terms
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

/// `plus - minus`; a missing side counts as zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Difference {
    pub plus: Option<Var>,
    pub minus: Option<Var>,
}

impl Difference {
    pub fn var(v: Var) -> Self {
        Self { plus: Some(v), minus: None }
    }

    pub fn between(plus: Var, minus: Var) -> Self {
        Self { plus: Some(plus), minus: Some(minus) }
    }

    fn eval(&self, x: &[f64]) -> f64 {
        self.plus.map_or(0.0, |v| x[v]) - self.minus.map_or(0.0, |v| x[v])
    }

    fn coefficients(&self) -> Vec<(Var, f64)> {
        let mut out = Vec::with_capacity(2);
        if let Some(p) = self.plus {
            out.push((p, 1.0));
        }
        if let Some(m) = self.minus {
            match out.iter_mut().find(|(v, _)| *v == m) {
                Some(entry) => entry.1 -= 1.0,
                None => out.push((m, -1.0)),
            }
        }
        out.retain(|(_, c)| *c != 0.0);
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constraint {
    pub term: Difference,
    pub relation: Relation,
    pub bound: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, x: &[f64], tolerance: f64) -> bool {
        let v = self.term.eval(x);
        match self.relation {
            Relation::LessOrEqual => v <= self.bound + tolerance,
            Relation::GreaterOrEqual => v >= self.bound - tolerance,
            Relation::Equal => (v - self.bound).abs() <= tolerance,
        }
    }
}

/// Soft request `weight * (term - target)^2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preference {
    pub term: Difference,
    pub target: f64,
    pub weight: f64,
}

/// Outcome of a successful solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolveReport {
    pub iterations: usize,
    /// False when the iteration cap stopped the optimisation early.
    pub converged: bool,
}

// ============================================================================
// Specification
// ============================================================================

#[derive(Clone, Debug)]
pub struct LinearSpec {
    values: Vec<f64>,
    constraints: Vec<Constraint>,
    preferences: Vec<Preference>,
    regularization: f64,
    max_iterations: usize,
}

impl LinearSpec {
    pub fn new(max_iterations: usize, regularization: f64) -> Self {
        Self {
            values: Vec::new(),
            constraints: Vec::new(),
            preferences: Vec::new(),
            regularization: regularization.max(EPSILON),
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn add_variable(&mut self, initial: f64) -> Var {
        self.values.push(initial);
        self.values.len() - 1
    }

    pub fn variable_count(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, v: Var) -> f64 {
        self.values.get(v).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn add_constraint(&mut self, term: Difference, relation: Relation, bound: f64) {
        self.constraints.push(Constraint { term, relation, bound });
    }

    pub fn add_preference(&mut self, term: Difference, target: f64, weight: f64) {
        if weight > 0.0 {
            self.preferences.push(Preference { term, target, weight });
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Solve in place. On error the previous values are left untouched.
    pub fn solve(&mut self) -> Result<SolveReport> {
        if self.values.is_empty() {
            return Ok(SolveReport { iterations: 0, converged: true });
        }
        let start = self.feasible_point()?;
        let (x, report) = self.optimise(start);
        if let Some(broken) = self.constraints.iter().find(|c| !c.is_satisfied(&x, 1e-6)) {
            return Err(CompositorError::GeometryInfeasible(format!(
                "solver drifted off constraint {:?}",
                broken
            )));
        }
        self.values = x;
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Phase 1: feasibility
    // ------------------------------------------------------------------------

    /// Bellman-Ford over the difference constraints, seeded with the current
    /// values. Node `n` stands for the constant zero.
    fn feasible_point(&self) -> Result<Vec<f64>> {
        let n = self.values.len();
        let zero = n;
        // (from, to, w) encodes x[to] - x[from] <= w.
        let mut edges: Vec<(usize, usize, f64)> = Vec::with_capacity(self.constraints.len() * 2);
        for c in &self.constraints {
            let p = c.term.plus.unwrap_or(zero);
            let m = c.term.minus.unwrap_or(zero);
            match c.relation {
                Relation::LessOrEqual => edges.push((m, p, c.bound)),
                Relation::GreaterOrEqual => edges.push((p, m, -c.bound)),
                Relation::Equal => {
                    edges.push((m, p, c.bound));
                    edges.push((p, m, -c.bound));
                }
            }
        }

        let mut dist = self.values.clone();
        dist.push(0.0);
        for _ in 0..=n + 1 {
            let mut changed = false;
            for &(from, to, w) in &edges {
                if dist[from] + w < dist[to] - EPSILON {
                    dist[to] = dist[from] + w;
                    changed = true;
                }
            }
            if !changed {
                let base = dist[zero];
                return Ok(dist[..n].iter().map(|d| d - base).collect());
            }
        }
        Err(CompositorError::GeometryInfeasible(
            "size constraints contradict each other".to_string(),
        ))
    }

    // ------------------------------------------------------------------------
    // Phase 2: active-set optimisation
    // ------------------------------------------------------------------------

    /// Rows `a . x >= b` (inequalities) and `a . x = b` (equalities).
    fn rows(&self) -> Vec<Row> {
        self.constraints
            .iter()
            .map(|c| {
                let coef = c.term.coefficients();
                match c.relation {
                    Relation::GreaterOrEqual => Row { coef, b: c.bound, equality: false },
                    Relation::Equal => Row { coef, b: c.bound, equality: true },
                    Relation::LessOrEqual => Row {
                        coef: coef.into_iter().map(|(v, a)| (v, -a)).collect(),
                        b: -c.bound,
                        equality: false,
                    },
                }
            })
            .filter(|r| !r.coef.is_empty())
            .collect()
    }

    fn hessian(&self) -> Vec<Vec<f64>> {
        let n = self.values.len();
        let mut h = vec![vec![0.0; n]; n];
        for (i, row) in h.iter_mut().enumerate() {
            row[i] = 2.0 * self.regularization;
        }
        for p in &self.preferences {
            let a = p.term.coefficients();
            for &(i, ai) in &a {
                for &(j, aj) in &a {
                    h[i][j] += 2.0 * p.weight * ai * aj;
                }
            }
        }
        h
    }

    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut g: Vec<f64> = x
            .iter()
            .zip(&self.values)
            .map(|(xi, pi)| 2.0 * self.regularization * (xi - pi))
            .collect();
        for p in &self.preferences {
            let r = p.term.eval(x) - p.target;
            for (v, a) in p.term.coefficients() {
                g[v] += 2.0 * p.weight * a * r;
            }
        }
        g
    }

    fn optimise(&self, mut x: Vec<f64>) -> (Vec<f64>, SolveReport) {
        let n = x.len();
        let rows = self.rows();
        let hessian = self.hessian();

        let mut working: Vec<usize> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if row.equality && independent(&rows, &working, row, n) {
                working.push(i);
            }
        }

        for iteration in 0..self.max_iterations {
            let g = self.gradient(&x);
            let Some((p, lambda)) = solve_kkt(&hessian, &g, &rows, &working) else {
                log::warn!("Layout KKT system singular after {} iterations", iteration);
                return (x, SolveReport { iterations: iteration, converged: false });
            };

            if p.iter().all(|v| v.abs() < EPSILON) {
                let candidate = working
                    .iter()
                    .zip(&lambda)
                    .filter(|(i, _)| !rows[**i].equality)
                    .min_by(|a, b| a.1.total_cmp(b.1));
                match candidate {
                    Some((&row, &l)) if l < -EPSILON => {
                        working.retain(|w| *w != row);
                        continue;
                    }
                    _ => return (x, SolveReport { iterations: iteration + 1, converged: true }),
                }
            }

            let mut alpha = 1.0;
            let mut blocking = None;
            for (i, row) in rows.iter().enumerate() {
                if row.equality || working.contains(&i) {
                    continue;
                }
                let ap = row.dot(&p);
                if ap < -EPSILON {
                    let step = ((row.dot(&x) - row.b) / -ap).max(0.0);
                    if step < alpha {
                        alpha = step;
                        blocking = Some(i);
                    }
                }
            }
            for (xi, pi) in x.iter_mut().zip(&p) {
                *xi += alpha * pi;
            }
            if let Some(row) = blocking {
                working.push(row);
            }
        }
        log::debug!("Layout solve hit the {}-iteration cap", self.max_iterations);
        (x, SolveReport { iterations: self.max_iterations, converged: false })
    }
}

#[derive(Clone, Debug)]
struct Row {
    coef: Vec<(Var, f64)>,
    b: f64,
    equality: bool,
}

impl Row {
    fn dot(&self, x: &[f64]) -> f64 {
        self.coef.iter().map(|(v, a)| a * x[*v]).sum()
    }

    fn dense(&self, n: usize) -> Vec<f64> {
        let mut out = vec![0.0; n];
        for (v, a) in &self.coef {
            out[*v] += a;
        }
        out
    }
}

/// Whether `row` adds rank to the rows already in `working`.
fn independent(rows: &[Row], working: &[usize], row: &Row, n: usize) -> bool {
    let mut matrix: Vec<Vec<f64>> = working.iter().map(|i| rows[*i].dense(n)).collect();
    matrix.push(row.dense(n));
    rank(&mut matrix) == matrix.len()
}

fn rank(m: &mut [Vec<f64>]) -> usize {
    let rows = m.len();
    let cols = m.first().map_or(0, |r| r.len());
    let mut rank = 0;
    for col in 0..cols {
        if rank == rows {
            break;
        }
        let pivot = (rank..rows).max_by(|a, b| m[*a][col].abs().total_cmp(&m[*b][col].abs()));
        let Some(pivot) = pivot else { break };
        if m[pivot][col].abs() < EPSILON {
            continue;
        }
        m.swap(rank, pivot);
        for r in rank + 1..rows {
            let f = m[r][col] / m[rank][col];
            for c in col..cols {
                m[r][c] -= f * m[rank][c];
            }
        }
        rank += 1;
    }
    rank
}

/// Solve `[H -A'; A 0] [p; l] = [-g; 0]` for the working rows `A`.
fn solve_kkt(h: &[Vec<f64>], g: &[f64], rows: &[Row], working: &[usize]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = g.len();
    let m = working.len();
    let size = n + m;
    let mut a = vec![vec![0.0; size + 1]; size];
    for i in 0..n {
        a[i][..n].copy_from_slice(&h[i]);
        a[i][size] = -g[i];
    }
    for (k, row) in working.iter().enumerate() {
        for (v, c) in &rows[*row].coef {
            a[*v][n + k] -= c;
            a[n + k][*v] += c;
        }
    }
    let solution = gaussian_elimination(a)?;
    Some((solution[..n].to_vec(), solution[n..].to_vec()))
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
fn gaussian_elimination(mut a: Vec<Vec<f64>>) -> Option<Vec<f64>> {
    let size = a.len();
    for col in 0..size {
        let pivot = (col..size).max_by(|x, y| a[*x][col].abs().total_cmp(&a[*y][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for r in col + 1..size {
            let f = a[r][col] / a[col][col];
            if f == 0.0 {
                continue;
            }
            for c in col..=size {
                a[r][c] -= f * a[col][c];
            }
        }
    }
    let mut x = vec![0.0; size];
    for r in (0..size).rev() {
        let tail: f64 = (r + 1..size).map(|c| a[r][c] * x[c]).sum();
        x[r] = (a[r][size] - tail) / a[r][r];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_preference_reached_without_constraints() {
        let mut spec = LinearSpec::new(15, 0.001);
        let l = spec.add_variable(0.0);
        let r = spec.add_variable(100.0);
        spec.add_preference(Difference::between(r, l), 300.0, 1.0);
        let report = spec.solve().unwrap();
        assert!(report.converged);
        // Regularisation splits the stretch evenly between both tabs.
        assert!(close(spec.value(r) - spec.value(l), 600_100.0 / 2001.0));
        assert!(close(spec.value(l), -spec.value(r) + 100.0));
    }

    #[test]
    fn test_bound_beats_preference() {
        let mut spec = LinearSpec::new(15, 0.001);
        let l = spec.add_variable(0.0);
        let r = spec.add_variable(100.0);
        spec.add_constraint(Difference::var(l), Relation::Equal, 0.0);
        spec.add_constraint(Difference::between(r, l), Relation::LessOrEqual, 150.0);
        spec.add_preference(Difference::between(r, l), 300.0, 1.0);
        spec.solve().unwrap();
        assert!(close(spec.value(l), 0.0));
        assert!(close(spec.value(r), 150.0));
    }

    #[test]
    fn test_min_bounds_push_shared_tab() {
        // Two areas side by side sharing tab `m`; the right one needs 200.
        let mut spec = LinearSpec::new(15, 0.001);
        let l = spec.add_variable(0.0);
        let m = spec.add_variable(150.0);
        let r = spec.add_variable(300.0);
        spec.add_constraint(Difference::between(m, l), Relation::GreaterOrEqual, 50.0);
        spec.add_constraint(Difference::between(r, m), Relation::GreaterOrEqual, 200.0);
        spec.add_preference(Difference::between(m, l), 150.0, 1.0);
        spec.add_preference(Difference::between(r, m), 150.0, 1.0);
        spec.add_preference(Difference::var(l), 0.0, 1000.0);
        spec.add_preference(Difference::var(r), 300.0, 1000.0);
        spec.solve().unwrap();
        assert!(spec.value(r) - spec.value(m) >= 200.0 - 1e-6);
        assert!(spec.value(m) - spec.value(l) >= 50.0 - 1e-6);
        assert!((spec.value(m) - 100.0).abs() < 2.0);
    }

    #[test]
    fn test_contradiction_is_infeasible_and_leaves_values() {
        let mut spec = LinearSpec::new(15, 0.001);
        let l = spec.add_variable(0.0);
        let m = spec.add_variable(200.0);
        let r = spec.add_variable(400.0);
        spec.add_constraint(Difference::between(m, l), Relation::GreaterOrEqual, 300.0);
        spec.add_constraint(Difference::between(r, m), Relation::GreaterOrEqual, 300.0);
        spec.add_constraint(Difference::between(r, l), Relation::LessOrEqual, 400.0);
        assert!(matches!(spec.solve(), Err(CompositorError::GeometryInfeasible(_))));
        assert_eq!(spec.values(), &[0.0, 200.0, 400.0]);
    }

    #[test]
    fn test_iteration_cap_still_feasible() {
        let mut spec = LinearSpec::new(1, 0.001);
        let vars: Vec<Var> = (0..6).map(|i| spec.add_variable(i as f64 * 10.0)).collect();
        for w in vars.windows(2) {
            spec.add_constraint(Difference::between(w[1], w[0]), Relation::GreaterOrEqual, 40.0);
            spec.add_preference(Difference::between(w[1], w[0]), 5.0, 1.0);
        }
        let report = spec.solve().unwrap();
        assert!(!report.converged);
        assert!(spec.constraints().iter().all(|c| c.is_satisfied(spec.values(), 1e-6)));
    }

    #[test]
    fn test_gaussian_elimination_pivots() {
        let a = vec![vec![0.0, 2.0, 4.0], vec![3.0, 1.0, 5.0]];
        let x = gaussian_elimination(a).unwrap();
        assert!(close(x[0], 1.0));
        assert!(close(x[1], 2.0));
    }
}
