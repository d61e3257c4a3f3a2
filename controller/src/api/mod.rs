pub mod apps;
pub mod callbacks;
pub mod templates;
pub mod upload;
pub mod users;

use crate::{auth::AuthLayer, state::ControllerState};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn router(state: ControllerState) -> Router {
    let secret = state.config.auth.secret_key.clone();

    let public = Router::new()
        .route("/login", post(users::login))
        .route("/register", post(users::register));

    let protected = Router::new()
        .route("/upload", post(upload::handle))
        .route("/apps", get(apps::list))
        .route("/status", get(apps::status))
        .route("/logs/{id}", get(apps::logs))
        .route("/stop", post(apps::stop_body))
        .route("/stop/{id}", post(apps::stop))
        .route("/restart/{id}", post(apps::restart))
        .route("/apps/{id}", delete(apps::delete))
        .route("/edit_app", post(apps::edit_app))
        .route("/templates", get(templates::list).post(templates::upload))
        .route("/save_template/{id}", post(templates::save_template))
        .route("/edit_template", post(templates::edit_template))
        .route("/templates/{id}", delete(templates::delete))
        .route("/deploy_template/{id}", post(templates::deploy_template))
        .route("/users", get(users::list))
        .route("/users/{id}", delete(users::delete))
        .route("/update_status", post(callbacks::update_status))
        .route("/heartbeat", post(callbacks::heartbeat))
        .layer(AuthLayer::new(secret));

    public.merge(protected).with_state(state).layer(TraceLayer::new_for_http())
}
