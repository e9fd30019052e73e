//! Integration tests for the `ralph` binary.

mod parallel_full;
