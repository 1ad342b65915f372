pub mod bus;
pub mod cache;
pub mod recommendation;
pub mod registry;
pub mod store;
pub mod training;
