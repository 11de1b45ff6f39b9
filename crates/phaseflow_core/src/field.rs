//! The 2D vector field model: a pair of compiled component functions and
//! their current parameter values.

use crate::compiler::{Arity, CompileError, CompiledFunction, DomainVar, EvalContext};
use crate::traits::Flow;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Canonical domain symbols for a planar field.
pub const DOMAIN_SYMBOLS: (&str, &str) = ("x", "y");

/// A vector field d/dt (x, y) = (vx(x, y, ...), vy(x, y, ...)) with both
/// components compiled from user-entered expression strings.
///
/// Replacing a component is atomic: the new expression is compiled first and
/// the old function (with its parameter values) is only discarded on
/// success, so a failed compile never leaves a half-updated field.
///
/// Evaluation scratch (VM stack and the noise RNG) lives in a `RefCell`, so
/// the model is `!Sync`; clone it per thread if that ever matters.
pub struct VectorField2D {
    vx: CompiledFunction,
    vy: CompiledFunction,
    vx_params: Vec<f64>,
    vy_params: Vec<f64>,
    ctx: RefCell<EvalContext>,
}

/// A field sampled over an n×n mesh, flattened row-major. What an arrow
/// plot consumes: position columns and the vector components at each point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSample {
    pub n: usize,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
}

impl VectorField2D {
    /// Compiles both component expressions; parameter values start at the
    /// suggested defaults.
    pub fn new(vx_source: &str, vy_source: &str) -> Result<Self, CompileError> {
        let vx = CompiledFunction::compile(vx_source, DOMAIN_SYMBOLS)?;
        let vy = CompiledFunction::compile(vy_source, DOMAIN_SYMBOLS)?;
        let vx_params = vx.default_vector();
        let vy_params = vy.default_vector();
        Ok(Self {
            vx,
            vy,
            vx_params,
            vy_params,
            ctx: RefCell::new(EvalContext::new()),
        })
    }

    /// Replaces the x-component. On error the previous function and its
    /// parameter values stay active.
    pub fn set_vx(&mut self, source: &str) -> Result<(), CompileError> {
        let compiled = CompiledFunction::compile(source, DOMAIN_SYMBOLS)?;
        self.vx_params = compiled.default_vector();
        self.vx = compiled;
        Ok(())
    }

    /// Replaces the y-component. On error the previous function and its
    /// parameter values stay active.
    pub fn set_vy(&mut self, source: &str) -> Result<(), CompileError> {
        let compiled = CompiledFunction::compile(source, DOMAIN_SYMBOLS)?;
        self.vy_params = compiled.default_vector();
        self.vy = compiled;
        Ok(())
    }

    pub fn vx(&self) -> &CompiledFunction {
        &self.vx
    }

    pub fn vy(&self) -> &CompiledFunction {
        &self.vy
    }

    /// Name/value pairs for the x-component's parameters, in declared order.
    pub fn vx_parameters(&self) -> Vec<(String, f64)> {
        Self::parameter_pairs(&self.vx, &self.vx_params)
    }

    /// Name/value pairs for the y-component's parameters, in declared order.
    pub fn vy_parameters(&self) -> Vec<(String, f64)> {
        Self::parameter_pairs(&self.vy, &self.vy_params)
    }

    pub fn set_vx_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        Self::set_parameter(&self.vx, &mut self.vx_params, name, value)
    }

    pub fn set_vy_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        Self::set_parameter(&self.vy, &mut self.vy_params, name, value)
    }

    /// Reseeds the noise RNG, for reproducible stochastic fields.
    pub fn reseed(&self, seed: u64) {
        *self.ctx.borrow_mut() = EvalContext::seeded(seed);
    }

    /// The field vector at a point. Each component is invoked with the
    /// domain values its own arity calls for: an x-only component sees just
    /// the x-coordinate, a constant component both (zero-padding rule).
    pub fn derivative_at(&self, xy: [f64; 2]) -> [f64; 2] {
        let ctx = &mut *self.ctx.borrow_mut();
        [
            Self::eval_component(&self.vx, &self.vx_params, xy, ctx),
            Self::eval_component(&self.vy, &self.vy_params, xy, ctx),
        ]
    }

    /// Samples both components over an n×n mesh spanning
    /// `bounds = [xmin, xmax, ymin, ymax]` via the vectorized path.
    pub fn sample_grid(&self, bounds: [f64; 4], n: usize) -> Result<GridSample> {
        let [xmin, xmax, ymin, ymax] = bounds;
        if !bounds.iter().all(|b| b.is_finite()) {
            bail!("Grid bounds must be finite.");
        }
        if xmax <= xmin || ymax <= ymin {
            bail!("Grid bounds must satisfy max > min on each axis.");
        }
        if n < 2 {
            bail!("Grid needs at least 2 samples per axis.");
        }

        let mut xs = Vec::with_capacity(n * n);
        let mut ys = Vec::with_capacity(n * n);
        let x_step = (xmax - xmin) / (n - 1) as f64;
        let y_step = (ymax - ymin) / (n - 1) as f64;
        for j in 0..n {
            let y = ymin + y_step * j as f64;
            for i in 0..n {
                xs.push(xmin + x_step * i as f64);
                ys.push(y);
            }
        }

        let ctx = &mut *self.ctx.borrow_mut();
        let dx = Self::eval_component_many(&self.vx, &self.vx_params, &xs, &ys, ctx)?;
        let dy = Self::eval_component_many(&self.vy, &self.vy_params, &xs, &ys, ctx)?;

        Ok(GridSample { n, xs, ys, dx, dy })
    }

    fn parameter_pairs(f: &CompiledFunction, values: &[f64]) -> Vec<(String, f64)> {
        f.parameters()
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect()
    }

    fn set_parameter(
        f: &CompiledFunction,
        values: &mut [f64],
        name: &str,
        value: f64,
    ) -> Result<()> {
        match f.parameters().iter().position(|p| p == name) {
            Some(idx) => {
                values[idx] = value;
                Ok(())
            }
            None => bail!("Unknown parameter '{name}'."),
        }
    }

    fn eval_component(
        f: &CompiledFunction,
        params: &[f64],
        xy: [f64; 2],
        ctx: &mut EvalContext,
    ) -> f64 {
        match f.arity() {
            Arity::Single(DomainVar::First) => f.eval_raw(ctx, &xy[..1], params),
            Arity::Single(DomainVar::Second) => f.eval_raw(ctx, &xy[1..], params),
            Arity::Constant | Arity::Double => f.eval_raw(ctx, &xy, params),
        }
    }

    fn eval_component_many(
        f: &CompiledFunction,
        params: &[f64],
        xs: &[f64],
        ys: &[f64],
        ctx: &mut EvalContext,
    ) -> Result<Vec<f64>> {
        let out = match f.arity() {
            Arity::Single(DomainVar::First) => f.evaluate_many(ctx, &[xs], params)?,
            Arity::Single(DomainVar::Second) => f.evaluate_many(ctx, &[ys], params)?,
            Arity::Constant | Arity::Double => f.evaluate_many(ctx, &[xs, ys], params)?,
        };
        Ok(out)
    }
}

impl Flow<f64> for VectorField2D {
    fn dimension(&self) -> usize {
        2
    }

    // The field is autonomous; t is ignored.
    fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
        let v = self.derivative_at([state[0], state[1]]);
        out[0] = v[0];
        out[1] = v[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_initialize_parameter_values() {
        let field = VectorField2D::new("a*x - b*y + k1", "c*x + d*y + k2").expect("compile");
        assert_eq!(
            field.vx_parameters(),
            vec![
                ("a".to_string(), 1.0),
                ("b".to_string(), 1.0),
                ("k1".to_string(), 0.0),
            ]
        );
        assert_eq!(
            field.vy_parameters(),
            vec![
                ("c".to_string(), 1.0),
                ("d".to_string(), 1.0),
                ("k2".to_string(), 0.0),
            ]
        );
    }

    #[test]
    fn origin_is_an_equilibrium_of_the_default_linear_field() {
        let field = VectorField2D::new("a*x - b*y + k1", "c*x + d*y + k2").expect("compile");
        assert_eq!(field.derivative_at([0.0, 0.0]), [0.0, 0.0]);
    }

    #[test]
    fn components_dispatch_on_their_own_arity() {
        let field = VectorField2D::new("y", "x").expect("compile");
        assert_eq!(field.vx().arity(), Arity::Single(DomainVar::Second));
        assert_eq!(field.vy().arity(), Arity::Single(DomainVar::First));
        assert_eq!(field.derivative_at([2.0, 5.0]), [5.0, 2.0]);
    }

    #[test]
    fn constant_component_still_evaluates() {
        let field = VectorField2D::new("1", "x").expect("compile");
        assert_eq!(field.vx().arity(), Arity::Constant);
        assert_eq!(field.derivative_at([3.0, 4.0]), [1.0, 3.0]);
    }

    #[test]
    fn failed_recompile_keeps_previous_component() {
        let mut field = VectorField2D::new("a*x", "y").expect("compile");
        field.set_vx_parameter("a", 2.0).expect("known parameter");

        assert!(field.set_vx("a*x +").is_err());

        assert_eq!(field.derivative_at([3.0, 1.0]), [6.0, 1.0]);
        assert_eq!(field.vx_parameters(), vec![("a".to_string(), 2.0)]);
    }

    #[test]
    fn successful_recompile_resets_parameters_to_defaults() {
        let mut field = VectorField2D::new("a*x", "y").expect("compile");
        field.set_vx_parameter("a", 5.0).expect("known parameter");

        field.set_vx("b*y + c").expect("compile");
        assert_eq!(
            field.vx_parameters(),
            vec![("b".to_string(), 1.0), ("c".to_string(), 0.0)]
        );
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let mut field = VectorField2D::new("a*x", "y").expect("compile");
        assert!(field.set_vx_parameter("q", 1.0).is_err());
    }

    #[test]
    fn sample_grid_covers_bounds_row_major() {
        let field = VectorField2D::new("x", "y").expect("compile");
        let grid = field.sample_grid([-1.0, 1.0, -2.0, 2.0], 3).expect("grid");

        assert_eq!(grid.xs.len(), 9);
        assert_eq!(grid.xs[..3], [-1.0, 0.0, 1.0]);
        assert_eq!(grid.ys[..3], [-2.0, -2.0, -2.0]);
        assert_eq!(grid.ys[8], 2.0);
        // vx = x and vy = y, so the sampled vectors mirror the mesh.
        assert_eq!(grid.dx, grid.xs);
        assert_eq!(grid.dy, grid.ys);
    }

    #[test]
    fn sample_grid_validates_inputs() {
        let field = VectorField2D::new("x", "y").expect("compile");
        assert!(field.sample_grid([1.0, -1.0, -1.0, 1.0], 3).is_err());
        assert!(field.sample_grid([-1.0, 1.0, -1.0, 1.0], 1).is_err());
        assert!(field
            .sample_grid([f64::NAN, 1.0, -1.0, 1.0], 3)
            .is_err());
    }

    #[test]
    fn reseeding_reproduces_noisy_fields() {
        let field = VectorField2D::new("noise(x)", "0").expect("compile");
        field.reseed(11);
        let first = field.derivative_at([0.0, 0.0]);
        field.reseed(11);
        let second = field.derivative_at([0.0, 0.0]);
        assert_eq!(first, second);
        assert!((-1.0..=1.0).contains(&first[0]));
        assert_eq!(first[1], 0.0);
    }
}
