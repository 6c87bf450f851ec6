#![allow(dead_code)]

pub mod mocks;
pub mod setup;

#[allow(unused_imports)]
pub use mocks::*;
#[allow(unused_imports)]
pub use setup::*;
