pub mod deliveries;

pub use deliveries::DeliveryService;
