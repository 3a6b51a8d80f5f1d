//! AUGUR: signal generation and decision engine for short-duration
//! crypto prediction markets.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod signal;
pub mod calibration;
pub mod strategy;
pub mod engine;
pub mod backtest;
pub mod data;
pub mod platforms;
pub mod storage;
pub mod alerts;
pub mod dashboard;
