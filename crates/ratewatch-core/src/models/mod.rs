//! Data models for RateWatch

mod corridor;
mod cycle;
mod rate;
mod subscription;

pub use corridor::*;
pub use cycle::*;
pub use rate::*;
pub use subscription::*;
