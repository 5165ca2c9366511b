//! Scenario-based tests for the node status engine

mod helpers;

mod abort_flow;
mod access_check;
mod intervention;
mod response_handling;
mod timeout_expiry;
