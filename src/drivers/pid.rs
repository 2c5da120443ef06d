use crate::drivers::filter::RateFilter;

/// Gains and set-point for one loop, as handed over by the command task.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidParams {
    pub reference: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Added to the output before saturation.
    pub offset: f32,
    /// Reference weight on the proportional term.
    pub beta: f32,
    /// Reference weight on the derivative term.
    pub gamma: f32,
}

impl Default for PidParams {
    fn default() -> Self {
        Self {
            reference: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            offset: 0.0,
            beta: 1.0,
            gamma: 1.0,
        }
    }
}

/// Two-degree-of-freedom PID with output saturation.
///
/// `u = offset + kp·(β·r − y) + ki·∫(r − y) + kd·d/dt(γ·r − y_f)`
///
/// `y_f` is the input after the optional rate filter. The integrator only
/// accepts a step when the output is unsaturated or the step pulls it back
/// inside the bounds.
#[derive(Clone, Debug)]
pub struct PidController {
    ts: f32,
    reference: f32,
    kp: f32,
    ki: f32,
    kd: f32,
    offset: f32,
    beta: f32,
    gamma: f32,
    sat_max: f32,
    sat_min: f32,
    integral: f32,
    prev_derivative_input: f32,
    primed: bool,
    running: bool,
}

impl PidController {
    pub const fn new() -> Self {
        Self {
            ts: 0.0,
            reference: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            offset: 0.0,
            beta: 1.0,
            gamma: 1.0,
            sat_max: f32::INFINITY,
            sat_min: f32::NEG_INFINITY,
            integral: 0.0,
            prev_derivative_input: 0.0,
            primed: false,
            running: false,
        }
    }

    /// Back to zero gains, stopped, sampling every `ts` seconds.
    pub fn init(&mut self, ts: f32) {
        *self = Self::new();
        self.ts = ts;
    }

    pub fn set_gains(&mut self, reference: f32, kp: f32, ki: f32, kd: f32) {
        self.reference = reference;
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    pub fn set_ref_weights(&mut self, beta: f32, gamma: f32) {
        self.beta = beta;
        self.gamma = gamma;
    }

    /// Bounds may be given in either order. NaN bounds are ignored.
    pub fn set_saturation(&mut self, max: f32, min: f32) {
        if max.is_nan() || min.is_nan() {
            return;
        }
        let (hi, lo) = if max >= min { (max, min) } else { (min, max) };
        self.sat_max = hi;
        self.sat_min = lo;
    }

    pub fn saturation(&self) -> (f32, f32) {
        (self.sat_max, self.sat_min)
    }

    pub fn set_reference(&mut self, reference: f32) {
        self.reference = reference;
    }

    pub fn reference(&self) -> f32 {
        self.reference
    }

    pub fn params(&self) -> PidParams {
        PidParams {
            reference: self.reference,
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            offset: self.offset,
            beta: self.beta,
            gamma: self.gamma,
        }
    }

    pub fn start(&mut self) {
        self.reset();
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_derivative_input = 0.0;
        self.primed = false;
    }

    pub fn run(&mut self, input: f32, filter: Option<&mut RateFilter>) -> f32 {
        let error = self.reference - input;

        let proportional = self.kp * (self.beta * self.reference - input);

        let filtered = match filter {
            Some(f) => f.apply(input),
            None => input,
        };
        let derivative_input = self.gamma * self.reference - filtered;
        let derivative = if self.primed && self.ts > 0.0 {
            self.kd * (derivative_input - self.prev_derivative_input) / self.ts
        } else {
            0.0
        };
        self.prev_derivative_input = derivative_input;
        self.primed = true;

        let integral = self.integral + self.ki * error * self.ts;
        let unsaturated = self.offset + proportional + integral + derivative;

        let output = if unsaturated > self.sat_max {
            self.sat_max
        } else if unsaturated < self.sat_min {
            self.sat_min
        } else {
            unsaturated
        };

        let winding_down = (unsaturated > self.sat_max && error < 0.0)
            || (unsaturated < self.sat_min && error > 0.0);
        if output == unsaturated || winding_down {
            self.integral = integral;
        }

        output
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::filter::{FilterKind, RateFilterParams};

    fn loop_with(kp: f32, ki: f32, kd: f32) -> PidController {
        let mut pid = PidController::new();
        pid.init(0.01);
        pid.set_gains(0.0, kp, ki, kd);
        pid.set_saturation(1.0, -1.0);
        pid.start();
        pid
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = loop_with(2.0, 0.0, 0.0);
        assert_eq!(pid.run(0.25, None), -0.5);
        assert_eq!(pid.run(-0.1, None), 0.2);
    }

    #[test]
    fn test_output_saturates() {
        let mut pid = loop_with(10.0, 0.0, 0.0);
        assert_eq!(pid.run(-1.0, None), 1.0);
        assert_eq!(pid.run(1.0, None), -1.0);
    }

    #[test]
    fn test_offset_and_reference_weighting() {
        let mut pid = loop_with(1.0, 0.0, 0.0);
        pid.set_offset(0.1);
        pid.set_ref_weights(0.5, 1.0);
        pid.set_reference(0.4);
        // 0.1 + 1.0 * (0.5 * 0.4 - 0.0)
        assert!((pid.run(0.0, None) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_integrator_accumulates_and_stops_at_saturation() {
        let mut pid = loop_with(0.0, 10.0, 0.0);
        let first = pid.run(-1.0, None);
        assert!((first - 0.1).abs() < 1e-6);
        for _ in 0..50 {
            pid.run(-1.0, None);
        }
        assert_eq!(pid.run(-1.0, None), 1.0);
        // No windup: one opposite step already leaves saturation.
        assert!(pid.run(1.0, None) < 1.0);
    }

    #[test]
    fn test_derivative_uses_filtered_input() {
        let mut pid = loop_with(0.0, 0.0, 0.01);
        assert_eq!(pid.run(0.0, None), 0.0);
        // d/dt(-y) = -(0.5 - 0.0) / 0.01 = -50, times kd
        assert!((pid.run(0.5, None) + 0.5).abs() < 1e-6);

        let b = [0.5, 0.5];
        let mut avg = RateFilter::new(&RateFilterParams {
            order: 1,
            kind: FilterKind::Fir,
            numerator: &b,
            denominator: &[],
        })
        .unwrap();
        let mut pid = loop_with(0.0, 0.0, 0.01);
        pid.run(0.0, Some(&mut avg));
        // Filtered input only moves halfway.
        assert!((pid.run(0.5, Some(&mut avg)) + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_start_and_stop_clear_history() {
        let mut pid = loop_with(0.0, 10.0, 0.0);
        pid.run(-1.0, None);
        pid.stop();
        assert!(!pid.is_running());
        pid.start();
        assert!((pid.run(-1.0, None) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_saturation_bounds_are_ordered() {
        let mut pid = PidController::new();
        pid.set_saturation(-2.0, 3.0);
        assert_eq!(pid.saturation(), (3.0, -2.0));
        pid.set_saturation(f32::NAN, 0.0);
        assert_eq!(pid.saturation(), (3.0, -2.0));
    }

    #[test]
    fn test_init_resets_configuration() {
        let mut pid = loop_with(1.0, 1.0, 1.0);
        pid.init(0.02);
        assert!(!pid.is_running());
        assert_eq!(pid.params(), PidParams::default());
    }
}
