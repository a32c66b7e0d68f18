#![allow(dead_code, non_snake_case, non_upper_case_globals)]

pub mod utils;
pub mod error;
pub mod config;
pub mod quadrature;
pub mod packet;
pub mod braket;
pub mod potential;
pub mod propagator;
pub mod simulation;
pub mod storage;
pub mod sampling;
