// Copyright (C) 2026 The guestbook authors
//
// This file is part of guestbook.
//
// guestbook is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// guestbook is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with guestbook.  If not,
// see <http://www.gnu.org/licenses/>.

//! # pages
//!
//! The guestbook's public routes.
//!
//! | path          | verb | does                                                |
//! |---------------|------|-----------------------------------------------------|
//! | `/`           | GET  | list the live instances, with links to each        |
//! | `/guestbook`  | GET  | show the most recent entries & the signing form     |
//! | `/sign`       | POST | append an entry, then redirect to `/guestbook`      |
//! | `/_ah/start`  | GET  | ensure the schema & register this instance          |
//! | `/_ah/stop`   | GET  | deregister this instance                            |

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use snafu::prelude::*;
use tracing::{debug, error, warn};

use crate::{
    entities::{EntryId, GuestbookEntry},
    http::{ErrorResponseBody, Guestbook},
    lifecycle::{self, StopTrigger},
    presentation::ServerLink,
    registry::alive_instances,
    storage::{self, Backend as StorageBackend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to sign the guestbook: {source}"))]
    Append { source: storage::Error },
    #[snafu(display("Failed to list guestbook entries: {source}"))]
    ListEntries { source: storage::Error },
    #[snafu(display("Failed to start this instance: {source}"))]
    Start { source: lifecycle::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // The backing store is down-- nothing the caller did wrong, try again later
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::Append { source } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to sign the guestbook: {}", source),
            ),
            Error::ListEntries { source } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to list guestbook entries: {}", source),
            ),
            Error::Start { source } => match source {
                lifecycle::Error::Register { .. } | lifecycle::Error::Schema { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("Failed to start: {}", source),
                ),
                ////////////////////////////////////////////////////////////////////////////////////
                // Internal failure-- own up to it:
                ////////////////////////////////////////////////////////////////////////////////////
                lifecycle::Error::Terminated { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to start: {}", source),
                ),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        error!("{:#?}", self);
        let (status, msg) = self.as_status_and_msg();
        (status, ErrorResponseBody { error: msg }).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                               `/`                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// List the instances currently registered, each linked to its own guestbook
///
/// Never fails: if the registry can't be read we show an empty (& flagged) list.
async fn list_servers(
    State(state): State<Arc<Guestbook>>,
    uri: Uri,
    headers: HeaderMap,
) -> Html<String> {
    let alive = alive_instances(state.registry.as_ref()).await;
    let servers = alive
        .sorted()
        .into_iter()
        .map(|instance_id| {
            let url = state
                .locator
                .url_for_instance(&instance_id)
                .inspect_err(|err| warn!("No link for instance {}: {}", instance_id, err))
                .ok();
            ServerLink { instance_id, url }
        })
        .collect::<Vec<ServerLink>>();
    let nav = state.identity.navigation(&headers, &uri.to_string());
    Html(state.templates.servers(&servers, alive.degraded(), &nav))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `/guestbook`                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn guestbook(
    State(state): State<Arc<Guestbook>>,
    uri: Uri,
    headers: HeaderMap,
) -> axum::response::Response {
    async fn guestbook1(
        storage: &(dyn StorageBackend + Send + Sync),
        posts_per_page: usize,
    ) -> Result<Vec<GuestbookEntry>> {
        storage
            .list_recent(posts_per_page)
            .await
            .context(ListEntriesSnafu)
    }

    match guestbook1(state.storage.as_ref(), state.posts_per_page).await {
        Ok(entries) => {
            let nav = state.identity.navigation(&headers, &uri.to_string());
            Html(state.templates.guestbook(&entries, &nav)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            `/sign`                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
pub struct SignReq {
    pub content: Option<String>,
}

/// Append an entry, attributed to the signed-in user if there is one
async fn sign(
    State(state): State<Arc<Guestbook>>,
    headers: HeaderMap,
    Form(sign_req): Form<SignReq>,
) -> axum::response::Response {
    async fn sign1(
        storage: &(dyn StorageBackend + Send + Sync),
        author: &str,
        content: &str,
    ) -> Result<EntryId> {
        storage.append(author, content).await.context(AppendSnafu)
    }

    let author = state.identity.current_user(&headers).unwrap_or_default();
    let content = sign_req.content.unwrap_or_default();
    match sign1(state.storage.as_ref(), &author, &content).await {
        Ok(id) => {
            debug!("Appended entry {}.", id);
            Redirect::to("/guestbook").into_response()
        }
        Err(err) => err.into_response(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `/_ah/start` & `/_ah/stop`                                  //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn start(State(state): State<Arc<Guestbook>>) -> axum::response::Response {
    match state.lifecycle.start().await.context(StartSnafu) {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

/// The hosting environment's stop request; may arrive with or without a shutdown signal
async fn stop(State(state): State<Arc<Guestbook>>) -> StatusCode {
    state.lifecycle.stop(StopTrigger::StopRequest).await;
    StatusCode::OK
}

pub fn make_router() -> Router<Arc<Guestbook>> {
    Router::new()
        .route("/", get(list_servers))
        .route("/guestbook", get(guestbook))
        .route("/sign", post(sign))
        .route("/_ah/start", get(start))
        .route("/_ah/stop", get(stop))
}

#[cfg(test)]
mod test {
    use super::*;

    use std::path::Path;

    use axum::{
        body::Body,
        http::{header, Request},
    };
    use tower::ServiceExt;

    use crate::{
        entities::{InstanceId, RegistryRoot},
        http::make_world_router,
        lifecycle::{Controller, State as LifecycleState, DEFAULT_DEREGISTER_TIMEOUT},
        marker_files::MarkerFiles,
        navigation::{HeaderIdentity, UrlTemplate, DEFAULT_INSTANCE_URL_TEMPLATE},
        presentation::PlainHtml,
        sqlite::Database,
    };

    async fn make_state(dir: &Path) -> Arc<Guestbook> {
        let storage = Arc::new(Database::new(dir.join("guestbook.db")));
        let registry = Arc::new(
            MarkerFiles::new(&dir.join("registry"), &RegistryRoot::default())
                .await
                .unwrap(),
        );
        Arc::new(Guestbook {
            storage: storage.clone(),
            registry: registry.clone(),
            lifecycle: Arc::new(Controller::new(
                InstanceId::new("vm-1").unwrap(),
                storage,
                registry,
                DEFAULT_DEREGISTER_TIMEOUT,
            )),
            templates: Box::new(PlainHtml),
            identity: Box::new(HeaderIdentity::default()),
            locator: Box::new(UrlTemplate::new(
                DEFAULT_INSTANCE_URL_TEMPLATE,
                "v1",
                "example.com",
            )),
            posts_per_page: 2,
        })
    }

    async fn get(state: &Arc<Guestbook>, uri: &str) -> (StatusCode, String) {
        let rsp = make_world_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = rsp.status();
        let body = axum::body::to_bytes(rsp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn sign_as(state: &Arc<Guestbook>, user: Option<&str>, body: &'static str) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/sign")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            req = req.header("x-guestbook-user", user);
        }
        let rsp = make_world_router(state.clone())
            .oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::SEE_OTHER);
        assert_eq!(rsp.headers()[header::LOCATION], "/guestbook");
    }

    #[tokio::test]
    async fn sign_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;

        assert_eq!(get(&state, "/_ah/start").await, (StatusCode::OK, String::new()));

        sign_as(&state, Some("alice"), "content=first").await;
        sign_as(&state, None, "content=%3Cscript%3Ealert(1)%3C%2Fscript%3E").await;
        sign_as(&state, Some("bob"), "content=third").await;
        // A missing field is stored as an empty entry
        sign_as(&state, None, "").await;

        let entries = state.storage.list_recent(0).await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].content(), "");
        assert_eq!(entries[1].author(), "bob");
        assert_eq!(entries[2].content(), "<script>alert(1)</script>");
        assert_eq!(entries[3].author(), "alice");

        let (status, body) = get(&state, "/guestbook").await;
        assert_eq!(status, StatusCode::OK);
        // Only `posts_per_page` entries, newest first
        assert!(body.contains("bob"));
        assert!(!body.contains("first"));
        assert!(!body.contains("&lt;script&gt;"));
        assert!(body.contains("continue=%2Fguestbook"));
    }

    #[tokio::test]
    async fn servers_follow_the_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;

        let (status, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("vm-1"));

        get(&state, "/_ah/start").await;
        get(&state, "/_ah/start").await;
        let (_, body) = get(&state, "/").await;
        assert!(body.contains("https://vm-1-dot-v1-dot-example.com/guestbook"));

        assert_eq!(get(&state, "/_ah/stop").await.0, StatusCode::OK);
        assert_eq!(get(&state, "/_ah/stop").await.0, StatusCode::OK);
        assert_eq!(state.lifecycle.state().await, LifecycleState::Deregistered);
        let (_, body) = get(&state, "/").await;
        assert!(!body.contains("vm-1"));

        // No coming back from that
        let (status, body) = get(&state, "/_ah/start").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("\"error\""));
    }

    #[tokio::test]
    async fn storage_failures_are_503s() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        // No schema yet
        let (status, body) = get(&state, "/guestbook").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorResponseBody = serde_json::from_str(&body).unwrap();
        assert!(body.error.starts_with("Failed to list guestbook entries"));
    }

    #[tokio::test]
    async fn request_ids() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        let rsp = make_world_router(state)
            .oneshot(
                Request::builder()
                    .uri("/healthcheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers()["x-request-id"], "0");
        let body = axum::body::to_bytes(rsp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"GOOD");
    }
}
