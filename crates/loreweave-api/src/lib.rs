pub mod auth;
pub mod characters;
pub mod convert;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod profile;
pub mod state;
pub mod stories;
pub mod verification;
pub mod votes;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use loreweave_gateway::connection;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Full HTTP surface: public reads, the authenticated API and the gateway.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/resend-code", post(auth::resend_code))
        .route("/auth/login", post(auth::login))
        .route("/stories", get(stories::list_stories))
        .route("/stories/{story_id}", get(stories::get_story))
        .route("/story-parts/{part_id}", get(stories::get_story_part))
        .route("/story-parts/{part_id}/votes/count", get(votes::count_positive))
        .route("/characters/{character_id}", get(characters::get_character))
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/characters",
            get(characters::list_characters).post(characters::create_character),
        )
        .route("/stories", post(stories::create_story))
        .route("/stories/{story_id}", axum::routing::delete(stories::delete_story))
        .route("/stories/{story_id}/turn", get(stories::get_turn))
        .route("/stories/{story_id}/parts", post(stories::add_story_part))
        .route("/story-parts/{part_id}/votes", post(votes::cast_vote))
        .route("/votes/mine", get(votes::my_votes))
        .route("/notifications/unread", get(notifications::unread))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/notifications/{notification_id}/view", get(notifications::view))
        .route(
            "/messages",
            get(messages::conversations).post(messages::send_message),
        )
        .route("/messages/{username}", get(messages::thread))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let notifier = state.notifier.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, notifier, jwt_secret))
}
