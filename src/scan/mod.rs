use crate::state::AppState;
use axum::Router;

pub mod camera;
mod dto;
pub mod handlers;
pub mod scanner;

pub use camera::FeedCamera;
pub use dto::LastScan;
pub use scanner::Scanner;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::scan_routes())
}
