pub use loam_core::*;
