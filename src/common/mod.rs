pub mod data;
pub mod fs;
pub mod proj;
