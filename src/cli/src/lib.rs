//! imgport CLI - inspect, validate, convert and sparsify disk images.

pub mod commands;
pub mod output;
