pub mod handlers;
pub mod job_handlers;
pub mod routes;

pub use handlers::*;
pub use job_handlers::*;
pub use routes::*;
