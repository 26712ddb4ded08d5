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

//! # navigation
//!
//! Who's asking, and where to send them.
//!
//! guestbook doesn't authenticate anyone itself, nor does it know how the hosting environment
//! routes traffic to a particular instance. Both are delegated: [Identity] names the current user
//! (if any) & produces the sign-in/sign-out link, and [InstanceLocator] turns an [InstanceId] into
//! an URL at which that instance's guestbook may be reached.

use axum::http::HeaderMap;
use snafu::{prelude::*, Backtrace};
use url::Url;

use crate::entities::InstanceId;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{text} is not a valid URL: {source}"))]
    InstanceUrl {
        text: String,
        source: url::ParseError,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// A link to sign in or out, with its link text
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Navigation {
    pub url: String,
    pub text: &'static str,
}

pub trait Identity {
    /// The nickname of the user making this request, if they're signed-in
    fn current_user(&self, headers: &HeaderMap) -> Option<String>;
    /// A "Login" link for anonymous users, a "Logout" link otherwise; either returns them to
    /// `original_url`
    fn navigation(&self, headers: &HeaderMap, original_url: &str) -> Navigation {
        let (mut url, text) = match self.current_user(headers) {
            Some(_) => (self.logout_url().clone(), "Logout"),
            None => (self.login_url().clone(), "Login"),
        };
        url.query_pairs_mut().append_pair("continue", original_url);
        Navigation {
            url: url.to_string(),
            text,
        }
    }
    fn login_url(&self) -> &Url;
    fn logout_url(&self) -> &Url;
}

/// Trust an upstream proxy to have authenticated the user & named them in a request header
#[derive(Clone, Debug)]
pub struct HeaderIdentity {
    user_header: String,
    login_url: Url,
    logout_url: Url,
}

impl HeaderIdentity {
    pub fn new(user_header: &str, login_url: Url, logout_url: Url) -> HeaderIdentity {
        HeaderIdentity {
            user_header: user_header.to_ascii_lowercase(),
            login_url,
            logout_url,
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        HeaderIdentity::new(
            "x-guestbook-user",
            Url::parse("http://localhost:8080/login").unwrap(/* known good */),
            Url::parse("http://localhost:8080/logout").unwrap(/* known good */),
        )
    }
}

impl Identity for HeaderIdentity {
    fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(self.user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_owned)
    }
    fn login_url(&self) -> &Url {
        &self.login_url
    }
    fn logout_url(&self) -> &Url {
        &self.logout_url
    }
}

pub trait InstanceLocator {
    /// Where `instance_id`'s guestbook may be found
    fn url_for_instance(&self, instance_id: &InstanceId) -> Result<Url>;
}

pub const DEFAULT_INSTANCE_URL_TEMPLATE: &str =
    "https://{instance}-dot-{version}-dot-{hostname}/guestbook";

/// Build instance URLs by substituting into a template
///
/// The template may refer to `{instance}`, `{version}` and `{hostname}`.
#[derive(Clone, Debug)]
pub struct UrlTemplate {
    template: String,
    version: String,
    hostname: String,
}

impl UrlTemplate {
    pub fn new(template: &str, version: &str, hostname: &str) -> UrlTemplate {
        UrlTemplate {
            template: template.to_owned(),
            version: version.to_owned(),
            hostname: hostname.to_owned(),
        }
    }
}

impl InstanceLocator for UrlTemplate {
    fn url_for_instance(&self, instance_id: &InstanceId) -> Result<Url> {
        let text = self
            .template
            .replace("{instance}", instance_id)
            .replace("{version}", &self.version)
            .replace("{hostname}", &self.hostname);
        Url::parse(&text).context(InstanceUrlSnafu { text })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use axum::http::HeaderValue;

    #[test]
    fn header_identity() {
        let identity = HeaderIdentity::default();
        let mut headers = HeaderMap::new();
        assert_eq!(identity.current_user(&headers), None);
        let nav = identity.navigation(&headers, "/guestbook");
        assert_eq!(nav.text, "Login");
        assert_eq!(
            nav.url,
            "http://localhost:8080/login?continue=%2Fguestbook"
        );

        headers.insert("x-guestbook-user", HeaderValue::from_static("  "));
        assert_eq!(identity.current_user(&headers), None);

        headers.insert("x-guestbook-user", HeaderValue::from_static("alice"));
        assert_eq!(identity.current_user(&headers), Some("alice".to_owned()));
        assert_eq!(identity.navigation(&headers, "/").text, "Logout");
    }

    #[test]
    fn url_template() {
        let locator = UrlTemplate::new(DEFAULT_INSTANCE_URL_TEMPLATE, "v2", "example.com");
        assert_eq!(
            locator
                .url_for_instance(&InstanceId::new("vm-1").unwrap())
                .unwrap()
                .as_str(),
            "https://vm-1-dot-v2-dot-example.com/guestbook"
        );
        let locator = UrlTemplate::new("{instance}", "", "");
        assert!(locator
            .url_for_instance(&InstanceId::new("vm-1").unwrap())
            .is_err());
    }
}
