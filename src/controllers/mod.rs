pub mod users;
pub mod events;
pub mod tickets;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(users::routes())
        .merge(events::routes())
        .merge(tickets::routes())
}
