use micromath::F32Ext;

/// Highest rate-filter order that fits the fixed coefficient storage.
pub const MAX_FILTER_ORDER: usize = 4;
const TAPS: usize = MAX_FILTER_ORDER + 1;

/// Third-order low-pass at a quarter of the sample rate (Butterworth).
///
/// The numerator is the binomial `[1, 3, 3, 1]` over 6, which gives unity
/// DC gain against the `4/3` denominator sum.
pub const DEFAULT_RATE_NUMERATOR: [f32; 4] = [1.0 / 6.0, 0.5, 0.5, 1.0 / 6.0];
pub const DEFAULT_RATE_DENOMINATOR: [f32; 4] = [1.0, 0.0, 1.0 / 3.0, 0.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FilterKind {
    /// Feedback filter: numerator and denominator.
    Iir = 0,
    /// Moving-average style: numerator only.
    Fir = 1,
}

impl TryFrom<u8> for FilterKind {
    type Error = FilterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Iir),
            1 => Ok(Self::Fir),
            other => Err(FilterError::UnknownType(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterError {
    ZeroOrder,
    OrderTooHigh(u8),
    /// Coefficient slices must hold `order + 1` values.
    CoefficientCount,
    UnknownType(u8),
}

/// Construction parameters for a [`RateFilter`].
///
/// The leading denominator coefficient is implicitly 1 and its value is
/// ignored. `Fir` filters ignore the denominator entirely.
#[derive(Clone, Copy, Debug)]
pub struct RateFilterParams<'a> {
    pub order: u8,
    pub kind: FilterKind,
    pub numerator: &'a [f32],
    pub denominator: &'a [f32],
}

impl RateFilterParams<'static> {
    pub const fn default_rate() -> Self {
        Self {
            order: 3,
            kind: FilterKind::Iir,
            numerator: &DEFAULT_RATE_NUMERATOR,
            denominator: &DEFAULT_RATE_DENOMINATOR,
        }
    }
}

/// Direct form I linear filter with fixed-size history.
///
/// `y[n] = Σ b[i]·x[n-i] - Σ_{i≥1} a[i]·y[n-i]`
#[derive(Clone, Debug)]
pub struct RateFilter {
    kind: FilterKind,
    order: usize,
    b: [f32; TAPS],
    a: [f32; TAPS],
    /// x[n], x[n-1], ...
    inputs: [f32; TAPS],
    /// y[n-1], y[n-2], ...
    outputs: [f32; TAPS],
}

impl RateFilter {
    pub fn new(params: &RateFilterParams<'_>) -> Result<Self, FilterError> {
        let order = params.order as usize;
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }
        if order > MAX_FILTER_ORDER {
            return Err(FilterError::OrderTooHigh(params.order));
        }
        if params.numerator.len() != order + 1 {
            return Err(FilterError::CoefficientCount);
        }

        let mut b = [0.0; TAPS];
        b[..=order].copy_from_slice(params.numerator);

        let mut a = [0.0; TAPS];
        if params.kind == FilterKind::Iir {
            if params.denominator.len() != order + 1 {
                return Err(FilterError::CoefficientCount);
            }
            a[1..=order].copy_from_slice(&params.denominator[1..]);
        }
        a[0] = 1.0;

        Ok(Self {
            kind: params.kind,
            order,
            b,
            a,
            inputs: [0.0; TAPS],
            outputs: [0.0; TAPS],
        })
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn apply(&mut self, sample: f32) -> f32 {
        let n = self.order;
        self.inputs.copy_within(0..n, 1);
        self.inputs[0] = sample;

        let mut acc = 0.0;
        for i in 0..=n {
            acc += self.b[i] * self.inputs[i];
        }
        if self.kind == FilterKind::Iir {
            for i in 1..=n {
                acc -= self.a[i] * self.outputs[i - 1];
            }
        }

        self.outputs.copy_within(0..n - 1, 1);
        self.outputs[0] = acc;
        acc
    }

    pub fn reset(&mut self) {
        self.inputs = [0.0; TAPS];
        self.outputs = [0.0; TAPS];
    }
}

/// Biquad Filter (Second order)
/// Using Direct Form 2 Transpose
pub struct BiquadFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
    initialized: bool,
}

impl BiquadFilter {
    pub fn new_lpf(cutoff_freq: f32, sample_rate: f32, q: f32) -> Self {
        let omega = 2.0 * core::f32::consts::PI * cutoff_freq / sample_rate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * q);

        let b0 = (1.0 - cs) / 2.0;
        let b1 = 1.0 - cs;
        let b2 = (1.0 - cs) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cs;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
            initialized: false,
        }
    }

    pub fn filter(&mut self, input: f32) -> f32 {
        if !self.initialized {
            // Start at steady state for a constant input
            self.z1 = input * (1.0 - self.b0);
            self.z2 = input * (self.b2 - self.a2);
            self.initialized = true;
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_parameters() {
        let b = [1.0, 0.0];
        let mut params = RateFilterParams {
            order: 0,
            kind: FilterKind::Fir,
            numerator: &b,
            denominator: &[],
        };
        assert_eq!(RateFilter::new(&params).err(), Some(FilterError::ZeroOrder));

        params.order = 5;
        assert_eq!(RateFilter::new(&params).err(), Some(FilterError::OrderTooHigh(5)));

        params.order = 2;
        assert_eq!(RateFilter::new(&params).err(), Some(FilterError::CoefficientCount));

        params.order = 1;
        params.kind = FilterKind::Iir;
        assert_eq!(RateFilter::new(&params).err(), Some(FilterError::CoefficientCount));

        assert_eq!(FilterKind::try_from(7), Err(FilterError::UnknownType(7)));
        assert_eq!(FilterKind::try_from(1), Ok(FilterKind::Fir));
    }

    #[test]
    fn test_fir_moving_average() {
        let b = [0.5, 0.5];
        let mut f = RateFilter::new(&RateFilterParams {
            order: 1,
            kind: FilterKind::Fir,
            numerator: &b,
            denominator: &[],
        })
        .unwrap();
        assert_eq!(f.apply(2.0), 1.0);
        assert_eq!(f.apply(4.0), 3.0);
        assert_eq!(f.apply(4.0), 4.0);
    }

    #[test]
    fn test_iir_first_order_recursion() {
        // y[n] = 0.5 x[n] + 0.5 y[n-1]
        let b = [0.5, 0.0];
        let a = [1.0, -0.5];
        let mut f = RateFilter::new(&RateFilterParams {
            order: 1,
            kind: FilterKind::Iir,
            numerator: &b,
            denominator: &a,
        })
        .unwrap();
        assert_eq!(f.apply(1.0), 0.5);
        assert_eq!(f.apply(1.0), 0.75);
        assert_eq!(f.apply(1.0), 0.875);
    }

    #[test]
    fn test_default_rate_filter_has_unity_dc_gain() {
        let mut f = RateFilter::new(&RateFilterParams::default_rate()).unwrap();
        assert_eq!(f.order(), 3);
        let mut y = 0.0;
        for _ in 0..200 {
            y = f.apply(1.0);
        }
        assert!((y - 1.0).abs() < 1e-4, "settled at {}", y);
    }

    #[test]
    fn test_default_rate_filter_rejects_nyquist() {
        let mut f = RateFilter::new(&RateFilterParams::default_rate()).unwrap();
        let mut y = 0.0;
        for n in 0..200 {
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            y = f.apply(x);
        }
        assert!(y.abs() < 1e-3, "alternating input leaked {}", y);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut f = RateFilter::new(&RateFilterParams::default_rate()).unwrap();
        let first = f.apply(1.0);
        f.apply(3.0);
        f.reset();
        assert_eq!(f.apply(1.0), first);
    }

    #[test]
    fn test_biquad_passes_dc() {
        let mut f = BiquadFilter::new_lpf(70.0, 1000.0, 0.707);
        let mut y = 0.0;
        for _ in 0..500 {
            y = f.filter(2.0);
        }
        assert!((y - 2.0).abs() < 1e-3);
    }
}
