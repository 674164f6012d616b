pub mod alerts;
pub mod coordinator;
pub mod feed;
pub mod orders;
pub mod proximity;
pub mod queue;
