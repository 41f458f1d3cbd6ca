/*
 * This module provides the application logic layer, centered around
 * `TreeSession`, which turns tree view commands into core operations and
 * reports back what the host has to update.
 * Unit tests for `TreeSession` are in `handler_tests.rs`.
 */
pub mod handler;


pub use handler::{TreeCommand, TreeSession, TreeUpdate};
