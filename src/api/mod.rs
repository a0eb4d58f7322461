pub mod health;
pub mod routes;

pub use routes::{router, ApiState, JobDefaults};
