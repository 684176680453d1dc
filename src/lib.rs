//! Shared fixtures for the School Gate benchmarks.

pub mod bench_support;
