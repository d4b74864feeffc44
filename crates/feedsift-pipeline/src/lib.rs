//! feedsift Pipeline
//!
//! The evaluation pipeline between content sources and connected clients:
//!
//! - [`SubscriptionRegistry`]: live subscriptions, their cursors and queues
//! - [`Scheduler`]: per-source poll cycles and per-(subscription, item)
//!   evaluation tasks
//! - [`DeliveryLoop`]: drains one subscription's queue for one connection
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(SubscriptionRegistry::new(config.registry, metrics.clone()));
//! let scheduler = Arc::new(Scheduler::new(
//!     registry.clone(), client, sources, config.scheduler, 32, metrics.clone(),
//! ));
//! scheduler.spawn();
//!
//! let id = registry.register(Prompt::new("zk proofs"), None);
//! let mut delivery = DeliveryLoop::new(registry, id, idle, cancel, metrics)?
//!     .with_keepalive(Duration::from_secs(15));
//! while let Some(step) = delivery.next().await {
//!     match step {
//!         Delivery::Match(result) => send(result).await?,
//!         Delivery::KeepAlive => ping().await?,
//!     }
//! }
//! ```

pub mod delivery;
pub mod registry;
pub mod scheduler;
pub mod subscription;

pub use delivery::{Delivery, DeliveryConfig, DeliveryEnd, DeliveryLoop};
pub use registry::{RegistryConfig, SubscriptionRegistry, SubscriptionSummary};
pub use scheduler::{Scheduler, SchedulerConfig, SourceSnapshot, SourceStatus};
pub use subscription::{Enqueued, Subscription, SubscriptionState};
