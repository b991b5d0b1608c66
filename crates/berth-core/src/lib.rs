//! Berth resource graph engine
//!
//! This crate provides the runtime-agnostic core of Berth: a typed
//! resource model for networks, images and containers, a dependency
//! graph with validation and level-based topological ordering, and an
//! executor that reconciles declared resources against a container
//! runtime through the [`RuntimeClient`] trait.

pub mod error;
pub mod executor;
pub mod graph;
pub mod observer;
pub mod resource;
pub mod runtime;
pub mod status;

pub use error::{ExecutorError, GraphError, RuntimeError};
pub use executor::{DEFAULT_STOP_TIMEOUT_SECS, Executor};
pub use graph::Graph;
pub use observer::{Event, EventKind, MultiObserver, Observer, TracingObserver};
pub use resource::{
    Container, LocalImage, Network, Port, Protocol, PullPolicy, RemoteImage, Resource, ResourceId,
    ResourceRef, RestartPolicy, Volume,
};
pub use runtime::{
    ContainerInfo, ContainerSpec, ImageBuildSpec, ImageInfo, NetworkInfo, NetworkSpec,
    RuntimeClient,
};
pub use status::Status;
