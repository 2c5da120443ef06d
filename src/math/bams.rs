//! Binary angular measurement (BAMS).
//!
//! A full turn maps onto the 16-bit range, so angle addition wraps for free
//! and trig reduces to a quarter-wave table lookup. Good to ~1e-5 on `sin`;
//! `acos` loses resolution close to ±1 where the table is flat.
use micromath::F32Ext;

use core::f32::consts::PI;

/// Counts in a quarter turn.
const QUARTER: u16 = 0x4000;
/// Counts in a half turn.
const HALF: u16 = 0x8000;
/// Table intervals across one quarter turn.
const TABLE_STEPS: usize = 256;
const COUNTS_PER_STEP: u16 = QUARTER / TABLE_STEPS as u16;
const RAD_PER_COUNT: f32 = 2.0 * PI / 65536.0;

/// sin(i·π/512) for i in 0..=256.
#[rustfmt::skip]
static QUARTER_SINE: [f32; TABLE_STEPS + 1] = [
    0.0000000, 0.0061359, 0.0122715, 0.0184067, 0.0245412, 0.0306748, 0.0368072, 0.0429383,
    0.0490677, 0.0551952, 0.0613207, 0.0674439, 0.0735646, 0.0796824, 0.0857973, 0.0919090,
    0.0980171, 0.1041216, 0.1102222, 0.1163186, 0.1224107, 0.1284981, 0.1345807, 0.1406582,
    0.1467305, 0.1527972, 0.1588581, 0.1649131, 0.1709619, 0.1770042, 0.1830399, 0.1890687,
    0.1950903, 0.2011046, 0.2071114, 0.2131103, 0.2191012, 0.2250839, 0.2310581, 0.2370236,
    0.2429802, 0.2489276, 0.2548657, 0.2607941, 0.2667128, 0.2726214, 0.2785197, 0.2844075,
    0.2902847, 0.2961509, 0.3020059, 0.3078496, 0.3136817, 0.3195020, 0.3253103, 0.3311063,
    0.3368899, 0.3426607, 0.3484187, 0.3541635, 0.3598950, 0.3656130, 0.3713172, 0.3770074,
    0.3826834, 0.3883450, 0.3939920, 0.3996242, 0.4052413, 0.4108432, 0.4164296, 0.4220003,
    0.4275551, 0.4330938, 0.4386162, 0.4441221, 0.4496113, 0.4550836, 0.4605387, 0.4659765,
    0.4713967, 0.4767992, 0.4821838, 0.4875502, 0.4928982, 0.4982277, 0.5035384, 0.5088301,
    0.5141027, 0.5193560, 0.5245897, 0.5298036, 0.5349976, 0.5401715, 0.5453250, 0.5504580,
    0.5555702, 0.5606616, 0.5657318, 0.5707807, 0.5758082, 0.5808140, 0.5857979, 0.5907597,
    0.5956993, 0.6006165, 0.6055110, 0.6103828, 0.6152316, 0.6200572, 0.6248595, 0.6296382,
    0.6343933, 0.6391244, 0.6438315, 0.6485144, 0.6531728, 0.6578067, 0.6624158, 0.6669999,
    0.6715590, 0.6760927, 0.6806010, 0.6850837, 0.6895405, 0.6939715, 0.6983762, 0.7027547,
    0.7071068, 0.7114322, 0.7157308, 0.7200025, 0.7242471, 0.7284644, 0.7326543, 0.7368166,
    0.7409511, 0.7450578, 0.7491364, 0.7531868, 0.7572088, 0.7612024, 0.7651673, 0.7691033,
    0.7730105, 0.7768885, 0.7807372, 0.7845566, 0.7883464, 0.7921066, 0.7958369, 0.7995373,
    0.8032075, 0.8068476, 0.8104572, 0.8140363, 0.8175848, 0.8211025, 0.8245893, 0.8280450,
    0.8314696, 0.8348629, 0.8382247, 0.8415550, 0.8448536, 0.8481203, 0.8513552, 0.8545580,
    0.8577286, 0.8608669, 0.8639729, 0.8670462, 0.8700870, 0.8730950, 0.8760701, 0.8790122,
    0.8819213, 0.8847971, 0.8876396, 0.8904487, 0.8932243, 0.8959662, 0.8986745, 0.9013488,
    0.9039893, 0.9065957, 0.9091680, 0.9117060, 0.9142098, 0.9166791, 0.9191139, 0.9215140,
    0.9238795, 0.9262102, 0.9285061, 0.9307670, 0.9329928, 0.9351835, 0.9373390, 0.9394592,
    0.9415441, 0.9435935, 0.9456073, 0.9475856, 0.9495282, 0.9514350, 0.9533060, 0.9551412,
    0.9569403, 0.9587035, 0.9604305, 0.9621214, 0.9637761, 0.9653944, 0.9669765, 0.9685221,
    0.9700313, 0.9715039, 0.9729400, 0.9743394, 0.9757021, 0.9770281, 0.9783174, 0.9795698,
    0.9807853, 0.9819639, 0.9831055, 0.9842101, 0.9852776, 0.9863081, 0.9873014, 0.9882576,
    0.9891765, 0.9900582, 0.9909026, 0.9917098, 0.9924795, 0.9932119, 0.9939070, 0.9945646,
    0.9951847, 0.9957674, 0.9963126, 0.9968203, 0.9972905, 0.9977231, 0.9981181, 0.9984756,
    0.9987955, 0.9990777, 0.9993224, 0.9995294, 0.9996988, 0.9998306, 0.9999247, 0.9999812,
    1.0000000,
];

/// Angle where 2^16 counts make one full turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bams16(pub u16);

impl Bams16 {
    pub const ZERO: Self = Self(0);
    pub const QUARTER_TURN: Self = Self(QUARTER);
    pub const HALF_TURN: Self = Self(HALF);

    /// Wraps any finite angle into one turn.
    pub fn from_rad(rad: f32) -> Self {
        Self((rad / RAD_PER_COUNT).round() as i32 as u16)
    }

    /// Angle in `[0, 2π)`.
    pub fn to_rad(self) -> f32 {
        self.0 as f32 * RAD_PER_COUNT
    }

    /// Angle in `[-π, π)`: counts read as two's complement.
    pub fn to_signed_rad(self) -> f32 {
        self.0 as i16 as f32 * RAD_PER_COUNT
    }

    pub fn sin(self) -> f32 {
        let offset = self.0 & (QUARTER - 1);
        match self.0 >> 14 {
            0 => quarter_sine(offset),
            1 => quarter_sine(QUARTER - offset),
            2 => -quarter_sine(offset),
            _ => -quarter_sine(QUARTER - offset),
        }
    }

    pub fn cos(self) -> f32 {
        Self(self.0.wrapping_add(QUARTER)).sin()
    }

    /// Inverse cosine over `[0, π]`. Inputs outside `[-1, 1]` are clamped.
    pub fn acos(x: f32) -> Self {
        let x = x.clamp(-1.0, 1.0);
        if x < 0.0 {
            Self(HALF - (QUARTER - asin_counts(-x)))
        } else {
            Self(QUARTER - asin_counts(x))
        }
    }

    pub fn wrapping_add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

/// Interpolated sine for `offset` in `0..=QUARTER`.
fn quarter_sine(offset: u16) -> f32 {
    let idx = (offset / COUNTS_PER_STEP) as usize;
    if idx >= TABLE_STEPS {
        return QUARTER_SINE[TABLE_STEPS];
    }
    let frac = (offset % COUNTS_PER_STEP) as f32 / COUNTS_PER_STEP as f32;
    let lo = QUARTER_SINE[idx];
    lo + (QUARTER_SINE[idx + 1] - lo) * frac
}

/// Arcsine in counts for `x` in `[0, 1]`, found by searching the sine table.
fn asin_counts(x: f32) -> u16 {
    if x >= QUARTER_SINE[TABLE_STEPS] {
        return QUARTER;
    }
    let mut lo = 0usize;
    let mut hi = TABLE_STEPS;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if QUARTER_SINE[mid] <= x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let span = QUARTER_SINE[hi] - QUARTER_SINE[lo];
    let frac = ((x - QUARTER_SINE[lo]) / span).clamp(0.0, 1.0);
    lo as u16 * COUNTS_PER_STEP + (frac * COUNTS_PER_STEP as f32 + 0.5) as u16
}
