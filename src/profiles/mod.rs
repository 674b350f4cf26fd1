use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod id;
pub mod repo_types;
pub mod services;
pub mod store;

pub use repo_types::Profile;
pub use store::ProfileStore;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::helper_routes())
}
