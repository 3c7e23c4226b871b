pub mod collective;
pub mod generation;
