//! # homeflow-domain
//!
//! Pure domain model for the homeflow automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** and the values they report
//! - Define **Automations** (trigger → action rules) and their schedules
//! - Define **Flows** (user-authored node graphs) and their structural checks
//! - Define **Geofences** and great-circle distance
//! - Solar-position math for sunrise / sunset triggers
//! - Define **Events** published by the engine
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod device;
pub mod event;
pub mod flow;
pub mod geo;
pub mod solar;
