//! # Hearth Core
//!
//! The dependency-injection layer of the Hearth request framework.
//!
//! - [`ContainerBuilder`] / [`Container`]: named async factories with
//!   singleton or prototype lifetimes, resolved recursively with cycle
//!   detection
//! - [`Component`]: types that describe their own registration
//! - [`ContextInjector`] / [`RequestContext`]: per-request attachment of
//!   every registered dependency
//!
//! Request dispatch lives in `hearth-framework`; configuration and logging
//! in `hearth-runtime`.

pub mod component;
pub mod container;
pub mod context;
pub mod error;
pub mod injector;
pub mod registry;

pub use component::Component;
pub use container::{Container, ContainerBuilder};
pub use context::RequestContext;
pub use error::{
    BoxError, ConfigurationError, ConfigurationResult, ContainerError, ContainerResult,
};
pub use injector::ContextInjector;
pub use registry::{Dependencies, FactoryDescriptor, FactoryFn, Instance, Registry, Strategy};
