pub mod bams;
pub mod quat;

pub use bams::Bams16;
pub use quat::Quaternion;
