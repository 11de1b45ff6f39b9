//! A particle advected by the field, with its trajectory history.

use crate::solvers::{ForwardEuler, Rk4};
use crate::traits::{Flow, Stepper};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Which one-step integrator `Particle::advance` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    ForwardEuler,
    RungeKutta,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown integration method '{0}'")]
pub struct UnknownMethod(String);

impl FromStr for Method {
    type Err = UnknownMethod;

    /// Accepts the UI labels ("Forward Euler", "Runge-Kutta") as well as
    /// the usual short spellings.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "forward euler" | "euler" => Ok(Method::ForwardEuler),
            "runge kutta" | "rungekutta" | "rk4" => Ok(Method::RungeKutta),
            _ => Err(UnknownMethod(name.to_string())),
        }
    }
}

/// A moving point plus an append-only trajectory buffer.
///
/// The trajectory starts with the initial position; each `advance` appends
/// exactly one point. There is no terminal state: the particle lives as
/// long as its owning session.
pub struct Particle {
    position: [f64; 2],
    method: Method,
    trajectory: Vec<[f64; 2]>,
    euler: ForwardEuler<f64>,
    rk4: Rk4<f64>,
}

impl Particle {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: [x, y],
            method: Method::RungeKutta,
            trajectory: vec![[x, y]],
            euler: ForwardEuler::new(2),
            rk4: Rk4::new(2),
        }
    }

    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn trajectory(&self) -> &[[f64; 2]] {
        &self.trajectory
    }

    /// Switches the integrator without touching position or history.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Advances one step of size dt through the given flow at t = 0 (the
    /// field is autonomous), appends the new position to the trajectory and
    /// returns it.
    pub fn advance(&mut self, flow: &impl Flow<f64>, dt: f64) -> [f64; 2] {
        debug_assert_eq!(flow.dimension(), 2);
        let mut t = 0.0;
        let mut state = self.position;
        match self.method {
            Method::ForwardEuler => self.euler.step(flow, &mut t, &mut state, dt),
            Method::RungeKutta => self.rk4.step(flow, &mut t, &mut state, dt),
        }
        self.position = state;
        self.trajectory.push(state);
        state
    }

    /// Clears the history and restarts from a new position.
    pub fn reset_position(&mut self, x: f64, y: f64) {
        self.position = [x, y];
        self.trajectory.clear();
        self.trajectory.push([x, y]);
    }

    /// Empties the history while keeping the current position.
    pub fn clear_trajectory(&mut self) {
        self.trajectory.clear();
    }
}
