pub mod ahrs;
pub mod crsf;
pub mod dshot;
pub mod filter;
pub mod pid;
pub mod servo;

#[cfg(feature = "firmware")]
pub mod icm42688;
