pub mod luminance;
pub mod stub;

pub use luminance::LuminanceEngine;
pub use stub::StubEngine;
