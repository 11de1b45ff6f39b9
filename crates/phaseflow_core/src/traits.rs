use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the integrators.
/// Must support floating-point arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of an autonomous ODE: d/dt state = derivative(state).
///
/// The field may still receive the current time `t` so steppers stay usable
/// for non-autonomous systems, but implementations in this crate ignore it.
pub trait Flow<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// state: current state
    /// out: buffer to write d(state)/dt into
    fn derivative(&self, t: T, state: &[T], out: &mut [T]);
}

/// A trait for integrators that advance a flow by one step.
pub trait Stepper<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, flow: &impl Flow<T>, t: &mut T, state: &mut [T], dt: T);
}
