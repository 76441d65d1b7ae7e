//! Cluster object store client
//!
//! Thin, typed access to the two object kinds the forward controller works
//! with: `Map` intents and their worker `Pod`s.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait, ObjectKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClusterClient::try_default().await?;
//!
//! let key = ObjectKey::new("default", "web");
//! match client.get_map(&key).await {
//!     Ok(map) => println!("{} is {}", key, map.phase()),
//!     Err(e) if e.is_not_found() => println!("{} is gone", key),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error taxonomy**: API failures are classified into `NotFound`,
//!   `AlreadyExists` and `Conflict` so callers can treat them as observations
//! - **Status-only writes**: guarded by `resourceVersion`, never touch spec
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use error::ClusterError;
pub use key::ObjectKey;
pub use cluster_trait::ClusterClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, MockFailure, MockOperation};
