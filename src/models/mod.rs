pub mod location;
pub mod notification;
pub mod order;
pub mod zone;
