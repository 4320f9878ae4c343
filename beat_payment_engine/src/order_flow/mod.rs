pub mod api;
pub mod errors;
pub mod matcher;
pub mod objects;
pub mod reconciler;

pub use api::OrderFlowApi;
pub use errors::OrderFlowError;
