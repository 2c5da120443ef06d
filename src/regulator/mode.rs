use core::sync::atomic::{AtomicU8, Ordering};

/// Operating mode of the regulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Loops stopped, servo disarmed, all outputs zero.
    Off = 0,
    /// Closed-loop yaw/pitch, thrust from the remote.
    Track = 1,
    /// Remote command passed straight through.
    RemoteControl = 2,
}

impl Mode {
    /// Control loops run only while tracking.
    pub fn runs_loops(self) -> bool {
        self == Mode::Track
    }

    pub fn arms_actuators(self) -> bool {
        self != Mode::Off
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidMode(pub u8);

impl TryFrom<u8> for Mode {
    type Error = InvalidMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Off),
            1 => Ok(Mode::Track),
            2 => Ok(Mode::RemoteControl),
            other => Err(InvalidMode(other)),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode as u8
    }
}

/// Current mode, readable from any context in one load.
pub struct ModeCell(AtomicU8);

impl ModeCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(Mode::Off as u8))
    }

    pub fn get(&self) -> Mode {
        // Only valid discriminants are ever stored.
        Mode::try_from(self.0.load(Ordering::Acquire)).unwrap_or(Mode::Off)
    }

    pub fn set(&self, mode: Mode) {
        self.0.store(mode as u8, Ordering::Release);
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}
