pub mod analysis;
pub mod audit;
pub mod batches;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod parcels;
pub mod routes;
pub mod vehicles;

pub use routes::create_router;
