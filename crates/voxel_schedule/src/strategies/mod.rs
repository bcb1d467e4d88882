//! Shipped scheduling strategies.

mod fifo;
mod maximize_available_work;

pub use fifo::Fifo;
pub use maximize_available_work::MaximizeAvailableWork;
