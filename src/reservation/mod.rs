pub mod aggregate;
pub mod quantity;

pub use aggregate::{ResourceAggregate, ResourceName, Reservations};
pub use quantity::{QuantityError, QuantityFormat, ResourceQuantity};
