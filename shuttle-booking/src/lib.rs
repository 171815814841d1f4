pub mod boarding;
pub mod fare;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod payment;
pub mod policy;
pub mod service;
pub mod validator;

pub use ledger::{CapacityLedger, Restoration};
pub use lifecycle::{BookingLifecycle, LifecycleEvent, SideEffect, Transition, TransitionOutcome};
pub use models::{BookingOutcome, BookingRequest, LegRequest, TripSelection};
pub use orchestrator::BookingOrchestrator;
pub use payment::{PassthroughGateway, PaymentResolver};
pub use policy::CancellationPolicy;
pub use service::{BookingRules, BookingService, BookingView};
pub use validator::StopSeatValidator;
