/// The `phaseflow_core` crate turns user-entered algebraic expressions into
/// fast numeric functions and integrates them as a 2D autonomous vector
/// field.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `Flow` (ODE right-hand
///   side), `Stepper` (one-step integrators).
/// - **Expression compiler**: parser, domain-arity classification and a
///   bytecode VM with the `rect`/`noise`/`zero` primitives.
/// - **Defaults**: the structural heuristic that suggests 1.0 for scaling
///   parameters and 0.0 for additive offsets.
/// - **Solvers**: Forward Euler and classic Runge-Kutta 4.
/// - **Field & Particle**: the compiled (vx, vy) pair with its parameter
///   values, and a moving point with trajectory history driven one tick at
///   a time by the presentation layer.
pub mod compiler;
pub mod defaults;
pub mod expr;
pub mod field;
pub mod particle;
pub mod solvers;
pub mod traits;
