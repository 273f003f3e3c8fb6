pub mod assets;
pub mod dsl;
pub mod generator;
