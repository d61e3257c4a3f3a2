mod remove_route;
mod restart;
mod run;
mod stop;

use crate::state::AgentState;
use axum::{routing::post, Router};

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/run", post(run::handle))
        .route("/restart", post(restart::handle))
        .route("/stop", post(stop::handle))
        .route("/remove_route", post(remove_route::handle))
        .with_state(state)
}
