//! Self-describing components.
//!
//! A [`Component`] declares its registry name, lifetime and dependency names
//! as associated constants, so registration needs no extra arguments:
//!
//! ```rust,ignore
//! use hearth_core::{BoxError, Component, Dependencies};
//!
//! struct UserRepository { db: Arc<Database> }
//!
//! #[async_trait::async_trait]
//! impl Component for UserRepository {
//!     const NAME: &'static str = "user_repository";
//!     const DEPENDENCIES: &'static [&'static str] = &["database"];
//!
//!     async fn create(deps: Dependencies) -> Result<Self, BoxError> {
//!         Ok(Self { db: deps.get("database")? })
//!     }
//! }
//!
//! builder.provide::<UserRepository>()?;
//! ```

use async_trait::async_trait;

use crate::error::BoxError;
use crate::registry::{Dependencies, Strategy};

/// A type that knows how to build itself from the container.
#[async_trait]
pub trait Component: Send + Sync + Sized + 'static {
    /// Registry name; also the attribute name in every request context.
    const NAME: &'static str;

    /// Instance lifetime.
    const STRATEGY: Strategy = Strategy::Singleton;

    /// Names passed to [`create`](Component::create), in order.
    const DEPENDENCIES: &'static [&'static str] = &[];

    /// Builds one instance from the resolved dependencies.
    async fn create(deps: Dependencies) -> Result<Self, BoxError>;
}
