pub mod health;
pub mod run;
pub mod status;
pub mod stop;

use axum::Router;

use crate::state::AppState;

pub fn control_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(status::router())
        .merge(run::router())
        .merge(stop::router())
}
