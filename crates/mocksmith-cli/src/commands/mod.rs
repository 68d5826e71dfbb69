pub mod analyse;
pub mod common;
pub mod generate;
pub mod seed;
