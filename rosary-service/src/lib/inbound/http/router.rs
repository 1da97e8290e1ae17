use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::middleware;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use axum::routing::put;
use axum::Router;
use tower::ServiceBuilder;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::handlers::auth;
use super::handlers::help;
use super::handlers::posts;
use super::handlers::users;
use super::middleware::authenticate as auth_middleware;
use crate::domain::help::ports::HelpServicePort;
use crate::domain::publication::ports::PublicationServicePort;
use crate::domain::user::ports::UserServicePort;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<dyn UserServicePort>,
    pub publication_service: Arc<dyn PublicationServicePort>,
    pub help_service: Arc<dyn HelpServicePort>,
}

/// Requests one client address may send within `period`.
///
/// Spent requests come back one at a time, evenly spread over the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub requests: u32,
    pub period: Duration,
}

impl RateLimitPolicy {
    fn replenish_interval_ms(&self) -> u64 {
        let per_request = self.period.as_millis() / u128::from(self.requests.max(1));
        u64::try_from(per_request).unwrap_or(u64::MAX).max(1)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests: 20,
            period: Duration::from_secs(10),
        }
    }
}

/// Build the HTTP application.
///
/// Requests are keyed by peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(
    user_service: Arc<dyn UserServicePort>,
    publication_service: Arc<dyn PublicationServicePort>,
    help_service: Arc<dyn HelpServicePort>,
    rate_limit: RateLimitPolicy,
) -> Router {
    let state = AppState {
        user_service,
        publication_service,
        help_service,
    };

    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/resend-verification", post(auth::resend_verification))
        .route("/api/auth/verify-account", get(auth::verify_account))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/verify-email", patch(auth::verify_email))
        .route("/api/auth/remind-password", patch(auth::remind_password))
        .route("/api/auth/reset-password", patch(auth::reset_password))
        .route("/api/posts", get(posts::list_outline))
        .route("/api/posts/:part/:mystery", get(posts::list_indices))
        .route("/api/posts/:part/:mystery/:index", get(posts::get_publication))
        .route("/api/help", get(help::get_help));

    let protected_routes = Router::new()
        .route("/api/users/me", get(users::get_me).delete(users::delete_account))
        .route("/api/users/me/password", patch(users::change_password))
        .route("/api/users/me/email", patch(users::change_email))
        .route("/api/users/me/cancel-deletion", post(users::cancel_deletion))
        .route(
            "/api/posts",
            post(posts::create_publication).put(posts::update_publication),
        )
        .route("/api/help", put(help::update_help))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Headers are left out of the span; they carry bearer tokens.
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version(),
            )
        })
        .on_request(|request: &Request<Body>, _span: &Span| {
            tracing::info!(
                method = %request.method(),
                path = %request.uri().path(),
                "Request started"
            );
        })
        .on_response(
            |response: &Response<Body>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis(),
                    "Request completed"
                );
            },
        );

    let mut routes = Router::new().merge(public_routes).merge(protected_routes);

    let governor = GovernorConfigBuilder::default()
        .per_millisecond(rate_limit.replenish_interval_ms())
        .burst_size(rate_limit.requests)
        .finish();
    match governor {
        Some(config) => {
            routes = routes.layer(GovernorLayer {
                config: Arc::new(config),
            });
        }
        None => tracing::warn!(?rate_limit, "Rate limit disabled by its settings"),
    }

    routes
        .layer(
            ServiceBuilder::new()
                .layer(trace_layer)
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replenish_interval() {
        assert_eq!(RateLimitPolicy::default().replenish_interval_ms(), 500);

        let tight = RateLimitPolicy {
            requests: 3,
            period: Duration::from_millis(2),
        };
        assert_eq!(tight.replenish_interval_ms(), 1);

        let zero = RateLimitPolicy {
            requests: 0,
            period: Duration::from_secs(1),
        };
        assert_eq!(zero.replenish_interval_ms(), 1000);
    }
}
