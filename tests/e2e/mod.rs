//! Settlement and trading end-to-end tests
#![allow(unused)]

mod environment;

pub use environment::*;
