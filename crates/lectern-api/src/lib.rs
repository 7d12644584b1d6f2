pub mod channels;
pub mod error;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod tracker;
