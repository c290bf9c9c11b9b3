#![doc = "storyforge-core: core logic library for storyforge."]

//! This crate contains the data models and pipelines for storyforge: the docs
//! preset that augments a bundler configuration, and the generator that
//! scaffolds documentation tooling into a project.
//! Process execution and network access live in the `storyforge` crate; the
//! collaborators this crate needs are expressed as traits in [`contract`].
//!
//! # Usage
//! - [`preset::webpack`] composes a [`bundler::BundlerConfig`].
//! - [`generator::scaffold`] runs the project generator against a
//!   [`contract::PackageManager`] and a [`contract::ProjectWriter`].

pub mod bundler;
pub mod config;
pub mod contract;
pub mod generator;
pub mod preset;
pub mod project;
pub mod resolve;
