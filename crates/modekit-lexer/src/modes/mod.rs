//! Rule tables for the languages modekit ships with.

pub mod coffee;
