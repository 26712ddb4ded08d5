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

//! End-to-end scenarios over HTTP
//!
//! Requests are dispatched in-process, straight into the [Router](axum::Router), so these don't
//! need a listening socket.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use libtest_mimic::Failed;
use tower::ServiceExt;

use guestbook::{
    entities::InstanceId,
    http::{make_world_router, Guestbook},
    lifecycle::{Controller, DEFAULT_DEREGISTER_TIMEOUT},
    navigation::{HeaderIdentity, UrlTemplate, DEFAULT_INSTANCE_URL_TEMPLATE},
    presentation::PlainHtml,
    registry::Backend as RegistryBackend,
    storage::Backend as StorageBackend,
};

use crate::Backends;

fn make_instance(
    name: &str,
    storage: Arc<dyn StorageBackend + Send + Sync>,
    registry: Arc<dyn RegistryBackend + Send + Sync>,
) -> Result<Arc<Guestbook>, Failed> {
    Ok(Arc::new(Guestbook {
        storage: storage.clone(),
        registry: registry.clone(),
        lifecycle: Arc::new(Controller::new(
            InstanceId::new(name)?,
            storage,
            registry,
            DEFAULT_DEREGISTER_TIMEOUT,
        )),
        templates: Box::new(PlainHtml),
        identity: Box::new(HeaderIdentity::default()),
        locator: Box::new(UrlTemplate::new(
            DEFAULT_INSTANCE_URL_TEMPLATE,
            "v1",
            "guestbook.example.com",
        )),
        posts_per_page: 20,
    }))
}

async fn send(
    instance: &Arc<Guestbook>,
    request: Request<Body>,
) -> Result<(StatusCode, String), Failed> {
    let rsp = make_world_router(instance.clone()).oneshot(request).await?;
    let status = rsp.status();
    let body = axum::body::to_bytes(rsp.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8(body.to_vec())?))
}

fn get(uri: &str) -> Result<Request<Body>, Failed> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn sign(user: &str, form: &'static str) -> Result<Request<Body>, Failed> {
    Ok(Request::builder()
        .method("POST")
        .uri("/sign")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-guestbook-user", user)
        .body(Body::from(form))?)
}

/// Sign on one instance, read on the other; each lists both while they're up
pub async fn test_two_instances_one_guestbook(backends: Backends) -> Result<(), Failed> {
    let vm1 = make_instance("vm-1", backends.storage, backends.registry)?;
    let vm2 = make_instance("vm-2", backends.peer_storage, backends.peer_registry)?;

    assert_eq!(send(&vm1, get("/_ah/start")?).await?.0, StatusCode::OK);
    assert_eq!(send(&vm2, get("/_ah/start")?).await?.0, StatusCode::OK);

    let (status, _) = send(&vm1, sign("alice", "content=hello")?).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let (status, _) = send(&vm2, sign("", "content=hi+%26+bye")?).await?;
    assert_eq!(status, StatusCode::SEE_OTHER);

    for instance in [&vm1, &vm2] {
        let (status, body) = send(instance, get("/guestbook")?).await?;
        assert_eq!(status, StatusCode::OK);
        let hi = body.find("hi &amp; bye").ok_or("missing the newer entry")?;
        let hello = body.find("hello").ok_or("missing the older entry")?;
        assert!(hi < hello);
        assert!(body.contains("alice"));
        assert!(body.contains("An anonymous person"));
    }

    let (_, body) = send(&vm2, get("/")?).await?;
    assert!(body.contains("https://vm-1-dot-v1-dot-guestbook.example.com/guestbook"));
    assert!(body.contains("https://vm-2-dot-v1-dot-guestbook.example.com/guestbook"));

    // vm-1 is stopped by the hosting environment; vm-2 no longer lists it
    assert_eq!(send(&vm1, get("/_ah/stop")?).await?.0, StatusCode::OK);
    let (_, body) = send(&vm2, get("/")?).await?;
    assert!(!body.contains("vm-1-dot"));
    assert!(body.contains("vm-2-dot"));

    // ...but its guestbook is still readable, since the store outlives any instance
    let (status, body) = send(&vm1, get("/guestbook")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("hello"));
    Ok(())
}

/// The healthcheck answers whatever the lifecycle state
pub async fn test_healthcheck(backends: Backends) -> Result<(), Failed> {
    let vm1 = make_instance("vm-1", backends.storage, backends.registry)?;
    assert_eq!(
        send(&vm1, get("/healthcheck")?).await?,
        (StatusCode::OK, "GOOD".to_owned())
    );
    Ok(())
}
