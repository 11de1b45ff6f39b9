use crate::traits::{Flow, Scalar, Stepper};

/// Forward Euler: state += dt * f(state, t).
///
/// First-order accurate and unconditionally cheap; no stability check is
/// performed, the caller is responsible for choosing a small enough dt.
pub struct ForwardEuler<T: Scalar> {
    dx: Vec<T>,
}

impl<T: Scalar> ForwardEuler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            dx: vec![T::from_f64(0.0).unwrap(); dim],
        }
    }
}

impl<T: Scalar> Stepper<T> for ForwardEuler<T> {
    fn step(&mut self, flow: &impl Flow<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;
        flow.derivative(t0, state, &mut self.dx);
        for i in 0..state.len() {
            state[i] = state[i] + dt * self.dx[i];
        }
        *t = t0 + dt;
    }
}

/// Classic Runge-Kutta 4th order: four derivative evaluations per step,
/// O(dt^4) local truncation error.
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Stepper<T> for Rk4<T> {
    fn step(&mut self, flow: &impl Flow<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        let t0 = *t;

        // k1 = f(t, y)
        flow.derivative(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        flow.derivative(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        flow.derivative(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        flow.derivative(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ZeroField;

    impl Flow<f64> for ZeroField {
        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, _state: &[f64], out: &mut [f64]) {
            out[0] = 0.0;
            out[1] = 0.0;
        }
    }

    /// (x, y)' = (y, -x): circular orbits of period 2*pi.
    struct HarmonicOscillator;

    impl Flow<f64> for HarmonicOscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
            out[0] = state[1];
            out[1] = -state[0];
        }
    }

    #[test]
    fn zero_field_leaves_state_unchanged() {
        for dt in [1e-3, 0.1, 2.0] {
            let mut euler_state = [0.7, -1.3];
            let mut rk4_state = [0.7, -1.3];
            let mut t = 0.0;
            ForwardEuler::new(2).step(&ZeroField, &mut t, &mut euler_state, dt);
            Rk4::new(2).step(&ZeroField, &mut t, &mut rk4_state, dt);
            assert_eq!(euler_state, [0.7, -1.3]);
            assert_eq!(rk4_state, [0.7, -1.3]);
        }
    }

    #[test]
    fn step_advances_time() {
        let mut state = [1.0, 0.0];
        let mut t = 0.5;
        Rk4::new(2).step(&HarmonicOscillator, &mut t, &mut state, 0.25);
        assert!((t - 0.75).abs() < 1e-12);
    }

    #[test]
    fn rk4_closes_harmonic_orbit() {
        // One full period in 1000 steps returns to the start.
        let dt = std::f64::consts::TAU / 1000.0;
        let mut solver = Rk4::new(2);
        let mut state = [1.0, 0.0];
        let mut t = 0.0;
        for _ in 0..1000 {
            solver.step(&HarmonicOscillator, &mut t, &mut state, dt);
        }
        assert!((state[0] - 1.0).abs() < 1e-3);
        assert!(state[1].abs() < 1e-3);
    }

    #[test]
    fn rk4_tracks_exact_harmonic_solution() {
        let dt = 0.01;
        let mut solver = Rk4::new(2);
        let mut state = [1.0, 0.0];
        let mut t = 0.0;
        for _ in 0..1000 {
            solver.step(&HarmonicOscillator, &mut t, &mut state, dt);
        }
        // Exact solution from (1, 0) is (cos t, -sin t).
        assert!((state[0] - (10.0_f64).cos()).abs() < 1e-6);
        assert!((state[1] + (10.0_f64).sin()).abs() < 1e-6);
    }

    #[test]
    fn forward_euler_spirals_outward_on_harmonic_orbit() {
        let dt = 0.01;
        let mut solver = ForwardEuler::new(2);
        let mut state = [1.0, 0.0];
        let mut t = 0.0;
        let mut prev_radius = 1.0;
        for _ in 0..1000 {
            solver.step(&HarmonicOscillator, &mut t, &mut state, dt);
            let radius = (state[0] * state[0] + state[1] * state[1]).sqrt();
            assert!(radius > prev_radius, "Euler radius should grow every step");
            prev_radius = radius;
        }
    }

    #[test]
    fn rk4_is_dimension_agnostic() {
        struct Decay;
        impl Flow<f64> for Decay {
            fn dimension(&self) -> usize {
                3
            }
            fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
                for i in 0..state.len() {
                    out[i] = -state[i];
                }
            }
        }

        let mut solver = Rk4::new(3);
        let mut state = [1.0, 2.0, -3.0];
        let mut t = 0.0;
        for _ in 0..100 {
            solver.step(&Decay, &mut t, &mut state, 0.01);
        }
        let factor = (-1.0_f64).exp();
        for (value, start) in state.iter().zip([1.0, 2.0, -3.0]) {
            assert!((value - start * factor).abs() < 1e-8);
        }
    }
}
