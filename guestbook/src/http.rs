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

//! # http
//!
//! Application state & the outermost [Router].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use axum::{
    http::{HeaderName, HeaderValue},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tap::Pipe;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    lifecycle,
    navigation::{Identity, InstanceLocator},
    pages::make_router as make_pages_router,
    presentation::Templates,
    registry::Backend as RegistryBackend,
    storage::Backend as StorageBackend,
};

/// A serializable struct for use in HTTP error responses
///
/// Handlers that fail return this as a JSON body, alongside whatever status code their error type
/// maps to.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

impl axum::response::IntoResponse for ErrorResponseBody {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// Application state available to all handlers
///
/// Built once at start-up & never mutated thereafter (the lifecycle controller guards its own
/// state).
pub struct Guestbook {
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
    pub registry: Arc<dyn RegistryBackend + Send + Sync>,
    pub lifecycle: Arc<lifecycle::Controller>,
    pub templates: Box<dyn Templates + Send + Sync>,
    pub identity: Box<dyn Identity + Send + Sync>,
    pub locator: Box<dyn InstanceLocator + Send + Sync>,
    /// Number of entries shown on the guestbook page; zero means all of them
    pub posts_per_page: usize,
}

async fn healthcheck() -> &'static str {
    "GOOD"
}

/// Counter for generating request IDs; a u64 is plenty & reads better in the logs than a UUID
#[derive(Clone, Debug, Default)]
pub struct RequestIdGenerator {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .pipe(|s| HeaderValue::from_str(&s).ok())
            .map(RequestId::new)
    }
}

/// Make the [Router] that will be accessible to the world
pub fn make_world_router(state: Arc<Guestbook>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .merge(make_pages_router())
        // Layers wrap everything added before them, so the last one applied sees requests first:
        //
        //                 requests
        //                    |
        //                    v
        // +---------  SetRequestIdLayer      ---------+
        // | +-----      TraceLayer         -----+     |
        // | | +--- PropagateRequestIdLayer ---+ |     |
        // | | |          handler              | |     |
        // | | +--- PropagateRequestIdLayer ---+ |     |
        // | +-----      TraceLayer         -----+     |
        // +---------   SetRequestIdLayer     ---------+
        //                    |
        //                    v
        //                responses
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            RequestIdGenerator::default(),
        ))
        .with_state(state)
}
