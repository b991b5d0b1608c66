//! Berth Docker runtime binding
//!
//! This crate implements the [`berth_core::RuntimeClient`] trait on top of
//! the Docker Engine API via bollard, including build context packaging and
//! registry authentication.

pub mod auth;
pub mod client;
pub mod context;
pub mod convert;

pub use client::DockerRuntime;
pub use convert::MANAGED_LABEL;
