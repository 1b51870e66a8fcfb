//! Multi-node test harness for the weft runtime: every node is a thread on
//! an in-process transport world.

pub mod helpers;
