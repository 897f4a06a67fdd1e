pub mod admission;
pub mod orchestrator;
pub mod ports;
pub mod runner;
pub mod trigger;

pub use admission::{AdmissionController, AdmissionPolicy, AdmissionSnapshot};
pub use orchestrator::Orchestrator;
pub use ports::{ConnectionInfo, DumpExecutor, Notification, Notifier, NotifySettings};
pub use runner::{Schedule, ScheduleRunner};
pub use trigger::TriggerCadence;
