//! Core value types for the execution engine: symbols, order state, the
//! unified order object, the client-order-index generator, and domain
//! errors. Everything in `helm-core` that touches an order ultimately
//! builds on the types declared here.

pub mod errors;
pub mod ids;
pub mod order;
pub mod types;

pub use errors::EngineError;
pub use ids::ClientOrderIdGenerator;
pub use order::{extract_filled_i64, Order, OrderEvent};
pub use types::{
    Balance, CanonicalSymbol, OrderState, Side, Trade, TopOfBook, VenueId, VenueSymbol,
};
