//! Link-time collector registration.
//!
//! Any crate linked into the final binary can contribute collectors:
//!
//! ```ignore
//! harvester_core::register_collector!("my-chain", |ctx| {
//!     Box::new(MyChainCollector::new(ctx))
//! });
//! ```

use crate::collector::{CollectContext, Collector};

/// A collector advertised by a linked crate.
pub struct CollectorPlugin {
    pub name: &'static str,
    pub factory: fn(&CollectContext) -> Box<dyn Collector>,
}

inventory::collect!(CollectorPlugin);

/// Every plugin submitted by the crates linked into this binary.
pub(crate) fn linked() -> impl Iterator<Item = &'static CollectorPlugin> {
    inventory::iter::<CollectorPlugin>.into_iter()
}

/// Submits a collector factory to the registry at link time.
#[macro_export]
macro_rules! register_collector {
    ($name:expr, $factory:expr) => {
        $crate::registry::__inventory::submit! {
            $crate::registry::CollectorPlugin {
                name: $name,
                factory: $factory,
            }
        }
    };
}
