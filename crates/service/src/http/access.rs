//! Ordered access-control chain wrapping every endpoint: method check,
//! source-network check, credential check.  Each stage short-circuits with
//! an HTTP status and a one-line message.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use ipnet::IpNet;

use super::{Endpoint, BASIC_AUTH_USER};
use crate::state::ServerState;

pub async fn enforce(
    State(state): State<ServerState>,
    Extension(endpoint): Extension<Endpoint>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(rejection) = verify_method(endpoint, request.method()) {
        return rejection;
    }
    let addr = connect_info.map(|ConnectInfo(addr)| addr);
    if let Err(rejection) = verify_network(state.allowed_nets(), addr) {
        return rejection;
    }
    let auth = auth.map(|TypedHeader(auth)| auth);
    if let Err(rejection) = authenticate_user(&state, auth.as_ref()) {
        return rejection;
    }
    next.run(request).await
}

fn in_repertoire(method: &Method) -> bool {
    *method == Method::GET || *method == Method::POST
}

/// Check that the endpoint's one accepted method is used.  Error handling
/// is based on RFC 7231, see Sections 6.5.5 (status 405) and 6.5.1
/// (status 400).
fn verify_method(endpoint: Endpoint, method: &Method) -> Result<(), Response> {
    if *method == endpoint.method() {
        return Ok(());
    }

    tracing::warn!(%method, endpoint = endpoint.name(), "unexpected http method");
    if in_repertoire(method) {
        return Err((
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, endpoint.method().to_string())],
            "Method Not Allowed",
        )
            .into_response());
    }
    Err((StatusCode::BAD_REQUEST, "Bad Request").into_response())
}

/// Enforce that the client connects from an allowed CIDR range
fn verify_network(allowed_nets: &[IpNet], addr: Option<SocketAddr>) -> Result<(), Response> {
    let Some(addr) = addr else {
        tracing::error!("request without source address information");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Missing request source address",
        )
            .into_response());
    };

    let ip = addr.ip();
    if allowed_nets.iter().any(|net| net.contains(&ip)) {
        return Ok(());
    }
    tracing::warn!(%addr, "blocked connection attempt");
    Err((StatusCode::FORBIDDEN, "Invalid IP address").into_response())
}

/// Enforce basic auth as defined in RFC 2617, Section 2
fn authenticate_user(
    state: &ServerState,
    auth: Option<&Authorization<Basic>>,
) -> Result<(), Response> {
    let Some(auth) = auth else {
        tracing::warn!("request without basic auth header");
        return Err((StatusCode::FORBIDDEN, "BasicAuth header is required").into_response());
    };

    if auth.username() != BASIC_AUTH_USER || auth.password() != state.basic_auth_password() {
        tracing::warn!(user = auth.username(), "unauthorized basic auth credentials");
        return Err((
            StatusCode::FORBIDDEN,
            "BasicAuth credentials were insufficient",
        )
            .into_response());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_method_repertoire() {
        assert!(in_repertoire(&Method::GET));
        assert!(in_repertoire(&Method::POST));
        assert!(!in_repertoire(&Method::HEAD));
        assert!(!in_repertoire(&Method::DELETE));
    }

    #[test]
    fn test_verify_method_status_split() {
        // wrong in-repertoire method: 405 with an Allow header
        let response = verify_method(Endpoint::Commit, &Method::POST).unwrap_err();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET");

        // method outside the repertoire: 400, no Allow header
        let response = verify_method(Endpoint::Commit, &Method::HEAD).unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(header::ALLOW));

        assert!(verify_method(Endpoint::Commit, &Method::GET).is_ok());
    }

    #[test]
    fn test_verify_network_requires_source_address() {
        let response = verify_network(&[], None).unwrap_err();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
