//! HTTP surface of the provisioning server.
//!
//! Endpoints are a fixed, closed set: each [`Endpoint`] variant carries its
//! path segment and the one method it accepts, and the router is built by
//! iterating them.  Routes accept any method so the access-control chain
//! can produce the RFC 7231 400/405 split itself.

pub mod access;
pub mod add_data;
pub mod add_secure_boot;
pub mod commit;

use std::time::Duration;

use axum::http::Method;
use axum::routing::any;
use axum::{middleware, Extension, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::ServerState;

/// Protocol name and version, the path prefix of every endpoint
pub const PROTOCOL: &str = "stprov/v0.0.1";

/// The fixed Basic-Auth user name
pub const BASIC_AUTH_USER: &str = "example-user";

/// The three provisioning endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    AddData,
    AddSecureBoot,
    Commit,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::AddData, Endpoint::AddSecureBoot, Endpoint::Commit];

    /// The endpoint's path segment under the protocol prefix
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::AddData => "add-data",
            Endpoint::AddSecureBoot => "add-secure-boot",
            Endpoint::Commit => "commit",
        }
    }

    /// The one HTTP method this endpoint accepts
    pub fn method(self) -> Method {
        match self {
            Endpoint::AddData | Endpoint::AddSecureBoot => Method::POST,
            Endpoint::Commit => Method::GET,
        }
    }

    /// The endpoint's full request path
    pub fn path(self) -> String {
        format!("/{}/{}", PROTOCOL, self.name())
    }
}

/// Build the provisioning router
pub fn router(state: ServerState, request_deadline: Duration) -> Router {
    let mut router = Router::new();
    for endpoint in Endpoint::ALL {
        let service = match endpoint {
            Endpoint::AddData => any(add_data::handler),
            Endpoint::AddSecureBoot => any(add_secure_boot::handler),
            Endpoint::Commit => any(commit::handler),
        };
        // the Extension layer must wrap the chain so the chain can see
        // which endpoint it guards
        let service = service
            .layer::<_, std::convert::Infallible>(middleware::from_fn_with_state(
                state.clone(),
                access::enforce,
            ))
            .layer(Extension(endpoint));
        router = router.route(&endpoint.path(), service);
    }
    router
        .layer(TimeoutLayer::new(request_deadline))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use common::prelude::{Entropy, OneTimePassword, ENTROPY_BYTES};

    use super::commit::CommitResponse;
    use super::*;
    use crate::config::parse_allow_list;
    use crate::state::Session;
    use crate::storage::MemSecureBootStore;

    const SECRET: &str = "red";
    const ALLOWED_ADDR: &str = "127.0.0.12:2009";

    struct Fixture {
        router: Router,
        session: Arc<Session>,
        secure_boot: Arc<MemSecureBootStore>,
        password: String,
    }

    fn fixture(setup_mode: bool) -> Fixture {
        let password = OneTimePassword::derive(SECRET)
            .unwrap()
            .basic_auth_password()
            .unwrap();
        let session = Arc::new(Session::new());
        let secure_boot = Arc::new(MemSecureBootStore::new(setup_mode));
        let allowed_nets =
            parse_allow_list(&["127.0.0.1/25".to_string(), "10.0.0.1/25".to_string()]).unwrap();
        let state = ServerState::new(
            session.clone(),
            secure_boot.clone(),
            allowed_nets,
            "mullis".to_string(),
            password.clone(),
        );
        Fixture {
            router: router(state, Duration::from_secs(5)),
            session,
            secure_boot,
            password,
        }
    }

    struct RequestParams<'a> {
        method: Method,
        addr: &'a str,
        password: Option<&'a str>,
        body: Option<String>,
    }

    fn build_request(endpoint: Endpoint, params: RequestParams) -> Request<Body> {
        let mut builder = Request::builder()
            .method(params.method)
            .uri(endpoint.path());
        if let Some(password) = params.password {
            let credentials = STANDARD.encode(format!("{BASIC_AUTH_USER}:{password}"));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {credentials}"));
        }
        let mut request = builder
            .body(params.body.map_or_else(Body::empty, Body::from))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(params.addr.parse::<SocketAddr>().unwrap()));
        request
    }

    fn entropy_body(entropy_bytes: usize, timestamp: i64) -> String {
        let entropy = STANDARD.encode(vec![0xffu8; entropy_bytes]);
        format!(r#"{{"entropy":"{entropy}","timestamp":{timestamp}}}"#)
    }

    #[tokio::test]
    async fn test_verify_method() {
        for endpoint in Endpoint::ALL {
            for method in [Method::GET, Method::POST, Method::HEAD] {
                let fx = fixture(true);
                let expected_ok = method == endpoint.method();
                let request = build_request(
                    endpoint,
                    RequestParams {
                        method: method.clone(),
                        addr: ALLOWED_ADDR,
                        password: Some(&fx.password),
                        body: Some(entropy_body(ENTROPY_BYTES, 1)),
                    },
                );
                let response = fx.router.oneshot(request).await.unwrap();

                if expected_ok {
                    continue;
                }
                if method == Method::HEAD {
                    // a method outside the repertoire is a malformed request
                    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                    assert!(!response.headers().contains_key(header::ALLOW));
                } else {
                    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
                    assert_eq!(
                        response.headers().get(header::ALLOW).unwrap(),
                        endpoint.method().as_str()
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_verify_network() {
        for (addr, expected_ok) in [
            ("10.0.0.12:2009", true),
            ("127.0.0.12:2009", true),
            ("127.0.0.128:2009", false),
            ("10.0.0.128:2009", false),
        ] {
            let fx = fixture(true);
            let request = build_request(
                Endpoint::AddData,
                RequestParams {
                    method: Method::POST,
                    addr,
                    password: Some(&fx.password),
                    body: Some(entropy_body(ENTROPY_BYTES, 1)),
                },
            );
            let response = fx.router.oneshot(request).await.unwrap();
            if expected_ok {
                assert_eq!(response.status(), StatusCode::OK, "{addr}");
            } else {
                assert_eq!(response.status(), StatusCode::FORBIDDEN, "{addr}");
            }
        }
    }

    #[tokio::test]
    async fn test_authenticate_user() {
        for (password, expected_ok) in [(None::<&str>, false), (Some("hotdog"), false)] {
            let fx = fixture(true);
            let request = build_request(
                Endpoint::Commit,
                RequestParams {
                    method: Method::GET,
                    addr: ALLOWED_ADDR,
                    password,
                    body: None,
                },
            );
            let response = fx.router.oneshot(request).await.unwrap();
            assert_eq!(
                response.status() == StatusCode::OK,
                expected_ok,
                "{password:?}"
            );
        }

        let fx = fixture(true);
        let request = build_request(
            Endpoint::Commit,
            RequestParams {
                method: Method::GET,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: None,
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_add_data() {
        for (description, body, expected_ok) in [
            (
                "bad json",
                entropy_body(ENTROPY_BYTES, 1).trim_end_matches('}').to_string(),
                false,
            ),
            ("no entropy", r#"{"timestamp":1}"#.to_string(), false),
            ("bad entropy", entropy_body(ENTROPY_BYTES + 1, 1), false),
            ("bad timestamp", entropy_body(ENTROPY_BYTES, -1), false),
            ("valid", entropy_body(ENTROPY_BYTES, 1), true),
        ] {
            let fx = fixture(true);
            let request = build_request(
                Endpoint::AddData,
                RequestParams {
                    method: Method::POST,
                    addr: ALLOWED_ADDR,
                    password: Some(&fx.password),
                    body: Some(body),
                },
            );
            let response = fx.router.oneshot(request).await.unwrap();
            if !expected_ok {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{description}");
                continue;
            }

            assert_eq!(response.status(), StatusCode::OK, "{description}");
            assert_eq!(fx.session.timestamp(), 1);
            assert_eq!(
                fx.session.entropy(),
                Entropy::from([0xff; ENTROPY_BYTES])
            );
        }
    }

    #[tokio::test]
    async fn test_commit() {
        let fx = fixture(true);
        let mut commit_rx = fx.session.subscribe_commit();
        let request = build_request(
            Endpoint::Commit,
            RequestParams {
                method: Method::GET,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: None,
            },
        );
        let response = fx.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let commit_response: CommitResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(commit_response.hostname, "mullis");
        assert!(commit_response.fingerprint.starts_with("SHA256:"));

        let uds = fx.session.uds().expect("uds stored on session");
        assert_eq!(
            commit_response.identity,
            uds.identity().unwrap().to_hex()
        );
        assert_eq!(
            commit_response.authentication,
            uds.authentication().unwrap().to_hex()
        );
        assert_eq!(
            commit_response.fingerprint,
            uds.ssh_host_key().unwrap().fingerprint()
        );
        assert!(*commit_rx.borrow_and_update(), "missing commit signal");

        // the commit transition is one-time: a replay conflicts
        let request = build_request(
            Endpoint::Commit,
            RequestParams {
                method: Method::GET,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: None,
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(fx.session.uds(), Some(uds));
    }

    fn secure_boot_body(pk: &str, kek: Option<&str>, db: Option<&str>, reboot: bool) -> String {
        let encode = |s: &str| STANDARD.encode(s.as_bytes());
        let kek = kek.map_or("null".to_string(), |s| format!(r#""{}""#, encode(s)));
        let db = db.map_or("null".to_string(), |s| format!(r#""{}""#, encode(s)));
        format!(
            r#"{{"pk":"{}","kek":{},"db":{},"dbx":null,"reboot_into_uefi_menu":{}}}"#,
            encode(pk),
            kek,
            db,
            reboot
        )
    }

    #[tokio::test]
    async fn test_add_secure_boot() {
        // firmware not in setup mode
        let fx = fixture(false);
        let request = build_request(
            Endpoint::AddSecureBoot,
            RequestParams {
                method: Method::POST,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: Some(secure_boot_body("pk", Some("kek"), Some("db"), false)),
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // missing required field
        let fx = fixture(true);
        let request = build_request(
            Endpoint::AddSecureBoot,
            RequestParams {
                method: Method::POST,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: Some(secure_boot_body("pk", Some("kek"), None, false)),
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // collaborator rejects the material
        let fx = fixture(true);
        fx.secure_boot.set_reject(true);
        let request = build_request(
            Endpoint::AddSecureBoot,
            RequestParams {
                method: Method::POST,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: Some(secure_boot_body("pk", Some("kek"), Some("db"), false)),
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // valid provisioning with a firmware-menu reboot request
        let fx = fixture(true);
        let request = build_request(
            Endpoint::AddSecureBoot,
            RequestParams {
                method: Method::POST,
                addr: ALLOWED_ADDR,
                password: Some(&fx.password),
                body: Some(secure_boot_body("pk", Some("kek"), Some("db"), true)),
            },
        );
        let response = fx.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = fx.secure_boot.stored().expect("keys stored");
        assert_eq!(stored.pk, b"pk");
        assert_eq!(stored.kek, b"kek");
        assert_eq!(stored.db, b"db");
        assert_eq!(stored.dbx, None);
        assert!(fx.secure_boot.reboot_requested());
    }
}
