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

use std::{future::Future, path::PathBuf};

use libtest_mimic::{Arguments, Failed, Trial};

use guestbook_test::{lifecycle, pages, registry, store, Backends, TestFuture};

#[derive(Debug)]
pub struct Test {
    pub name: &'static str,
    pub test_fn: fn(backends: Backends) -> TestFuture,
}

inventory::collect!(Test);

/// Run every registered test, each against freshly-opened [Backends]
///
/// `open` is the fixture: given an empty temporary directory, it creates the stores under test
/// there. Each trial gets its own directory & its own Tokio runtime.
pub fn run<F, Fut>(open: F) -> !
where
    F: Fn(PathBuf) -> Fut + Copy + Send + 'static,
    Fut: Future<Output = Result<Backends, Failed>>,
{
    let args = Arguments::from_args();
    let conclusion = libtest_mimic::run(
        &args,
        inventory::iter::<Test>
            .into_iter()
            .map(|test| {
                let test_fn = test.test_fn;
                Trial::test(test.name, move || {
                    let dir = tempfile::tempdir()?;
                    let rt = tokio::runtime::Runtime::new()?;
                    rt.block_on(async {
                        let backends = open(dir.path().to_path_buf()).await?;
                        test_fn(backends).await
                    })
                })
            })
            .collect(),
    );
    conclusion.exit();
}

inventory::submit!(Test {
    name: "store::entries_newest_first",
    test_fn: |b| Box::pin(store::test_entries_newest_first(b)),
});

inventory::submit!(Test {
    name: "store::list_recent_limits",
    test_fn: |b| Box::pin(store::test_list_recent_limits(b)),
});

inventory::submit!(Test {
    name: "store::ids_increase_across_instances",
    test_fn: |b| Box::pin(store::test_ids_increase_across_instances(b)),
});

inventory::submit!(Test {
    name: "store::ensure_schema_is_idempotent",
    test_fn: |b| Box::pin(store::test_ensure_schema_is_idempotent(b)),
});

inventory::submit!(Test {
    name: "store::no_schema_is_unavailable",
    test_fn: |b| Box::pin(store::test_no_schema_is_unavailable(b)),
});

inventory::submit!(Test {
    name: "registry::register_list_deregister",
    test_fn: |b| Box::pin(registry::test_register_list_deregister(b)),
});

inventory::submit!(Test {
    name: "registry::idempotence",
    test_fn: |b| Box::pin(registry::test_idempotence(b)),
});

inventory::submit!(Test {
    name: "registry::instances_see_each_other",
    test_fn: |b| Box::pin(registry::test_instances_see_each_other(b)),
});

inventory::submit!(Test {
    name: "registry::concurrent_registration",
    test_fn: |b| Box::pin(registry::test_concurrent_registration(b)),
});

inventory::submit!(Test {
    name: "lifecycle::forced_stop",
    test_fn: |b| Box::pin(lifecycle::test_forced_stop(b)),
});

inventory::submit!(Test {
    name: "lifecycle::both_triggers",
    test_fn: |b| Box::pin(lifecycle::test_both_triggers(b)),
});

inventory::submit!(Test {
    name: "lifecycle::two_instances",
    test_fn: |b| Box::pin(lifecycle::test_two_instances(b)),
});

inventory::submit!(Test {
    name: "lifecycle::stop_before_start",
    test_fn: |b| Box::pin(lifecycle::test_stop_before_start(b)),
});

inventory::submit!(Test {
    name: "pages::two_instances_one_guestbook",
    test_fn: |b| Box::pin(pages::test_two_instances_one_guestbook(b)),
});

inventory::submit!(Test {
    name: "pages::healthcheck",
    test_fn: |b| Box::pin(pages::test_healthcheck(b)),
});
