// ABOUTME: Field extraction building blocks: locator model, resolver, caches and value helpers.
// ABOUTME: Everything here is pure and operates on an already-parsed document.

pub mod compiled;
pub mod fields;
pub mod locator;
pub mod resolve;
