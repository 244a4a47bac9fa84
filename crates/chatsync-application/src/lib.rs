pub mod chat_client;
pub mod consumer;
pub mod reconcile_scheduler;

pub use chat_client::ChatClient;
pub use consumer::ConsumerScope;
pub use reconcile_scheduler::ReconcileScheduler;
