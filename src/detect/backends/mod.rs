pub mod stub;

pub use stub::StubInference;
