//! 도메인 모델.

pub mod instrument;
pub mod market;
pub mod signal;
pub mod strategy;

pub use instrument::*;
pub use market::*;
pub use signal::*;
pub use strategy::*;
