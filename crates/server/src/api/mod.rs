pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod steps;
pub mod ws;

pub use routes::create_router;
pub use ws::WsMessage;
