//! Services module for invoicing-service.

pub mod authz;
pub mod calculator;
pub mod clock;
pub mod database;
pub mod dispatcher;
pub mod email;
pub mod events;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod scheduler;
pub mod status;
pub mod store;

pub use authz::{Authorizer, OrganizationScopeAuthorizer};
pub use calculator::LineItemCalculator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use dispatcher::{DispatchSummary, DispatcherSettings, ReminderDispatcher};
pub use email::{EmailTransport, MockEmailTransport, SmtpTransport};
pub use events::{InvoiceChangeListener, LoggingChangeListener};
pub use invoices::{InvoiceService, InvoiceView};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use scheduler::ReminderScheduler;
pub use status::{InvoiceStatusMachine, OptimisticStatus, TransitionPolicy};
pub use store::InvoiceStore;
