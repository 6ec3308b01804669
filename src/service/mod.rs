//! Process-pool services.
//!
//! Two variants over one shared core: `ModelService` (bounded pool of
//! long-lived model runners) and `ParamFinderService` (one-shot analysis
//! runs, one per metric). The IPC bridges drive either through the
//! `UnitService` seam.

pub mod error;
pub mod events;
pub mod model;
pub mod param_finder;
pub mod pool;

use crossbeam_channel::Receiver;
use serde_json::Value;

pub use error::ServiceError;
pub use events::UnitEvent;
pub use model::ModelService;
pub use param_finder::ParamFinderService;

/// Common surface of the two pool services, as seen from an IPC bridge.
///
/// `create_unit` must fail synchronously on admission errors (capacity,
/// duplicate id) so callers can pre-flight; all worker activity after a
/// successful create is delivered through the unit's event subscription.
pub trait UnitService: Send + Sync {
    fn create_unit(&self, unit_id: &str, params: &Value) -> Result<(), ServiceError>;
    fn remove_unit(&self, unit_id: &str) -> Result<(), ServiceError>;
    fn send_data(&self, unit_id: &str, record: &Value) -> Result<(), ServiceError>;
    /// Snapshot of live unit ids, in creation order.
    fn unit_ids(&self) -> Vec<String>;
    fn subscribe(&self, unit_id: &str) -> Receiver<UnitEvent>;
    fn unsubscribe(&self, unit_id: &str);
}
