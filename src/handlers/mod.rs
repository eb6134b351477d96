pub mod recordings;

pub use recordings::*;
