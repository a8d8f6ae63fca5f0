//! Integration tests for dhtcell

mod integration;
