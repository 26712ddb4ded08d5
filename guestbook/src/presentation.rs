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

//! # presentation
//!
//! Page rendering, behind the [Templates] trait. [PlainHtml] is the bare-bones implementation
//! `guestbookd` ships with.

use std::fmt::Write;

use url::Url;

use crate::{
    entities::{GuestbookEntry, InstanceId},
    navigation::Navigation,
};

/// One row on the instance list page
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerLink {
    pub instance_id: InstanceId,
    /// None if no URL could be built for this instance
    pub url: Option<Url>,
}

pub trait Templates {
    /// The list of live instances; `degraded` means the registry couldn't be read
    fn servers(&self, servers: &[ServerLink], degraded: bool, nav: &Navigation) -> String;
    /// Guestbook entries, most recent first, along with the signing form
    fn guestbook(&self, entries: &[GuestbookEntry], nav: &Navigation) -> String;
}

/// Escape text for inclusion in HTML element content or a double-quoted attribute
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Debug, Default)]
pub struct PlainHtml;

impl PlainHtml {
    fn page(title: &str, nav: &Navigation, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n{body}\
             <a href=\"{url}\">{text}</a>\n</body>\n</html>\n",
            title = escape_html(title),
            body = body,
            url = escape_html(&nav.url),
            text = escape_html(nav.text),
        )
    }
}

impl Templates for PlainHtml {
    fn servers(&self, servers: &[ServerLink], degraded: bool, nav: &Navigation) -> String {
        let mut body = String::from("<h1>Active servers</h1>\n");
        if degraded {
            body.push_str("<p>The instance registry is unavailable right now.</p>\n");
        }
        body.push_str("<ul>\n");
        for server in servers {
            let id = escape_html(&server.instance_id);
            // `write!` to a String can't fail
            let _ = match &server.url {
                Some(url) => writeln!(
                    body,
                    "<li><a href=\"{}\">{}</a></li>",
                    escape_html(url.as_str()),
                    id
                ),
                None => writeln!(body, "<li>{}</li>", id),
            };
        }
        body.push_str("</ul>\n");
        PlainHtml::page("Active servers", nav, &body)
    }

    fn guestbook(&self, entries: &[GuestbookEntry], nav: &Navigation) -> String {
        let mut body = String::from("<h1>Guestbook</h1>\n");
        for entry in entries {
            let author = if entry.author().is_empty() {
                "An anonymous person".to_owned()
            } else {
                escape_html(entry.author())
            };
            let _ = writeln!(
                body,
                "<div class=\"entry\" id=\"entry-{}\"><b>{}</b> wrote:<blockquote>{}</blockquote></div>",
                entry.id(),
                author,
                escape_html(entry.content())
            );
        }
        body.push_str(
            "<form action=\"/sign\" method=\"post\">\n\
             <div><textarea name=\"content\" rows=\"3\" cols=\"60\"></textarea></div>\n\
             <div><input type=\"submit\" value=\"Sign Guestbook\"></div>\n\
             </form>\n",
        );
        PlainHtml::page("Guestbook", nav, &body)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::entities::EntryId;

    fn nav() -> Navigation {
        Navigation {
            url: "http://localhost/login?continue=%2F&x=1".to_owned(),
            text: "Login",
        }
    }

    #[test]
    fn escaping() {
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#x27;y&#x27;&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn guestbook_page() {
        let html = PlainHtml.guestbook(
            &[
                GuestbookEntry::new(EntryId::from(2), "", "<b>hi</b>"),
                GuestbookEntry::new(EntryId::from(1), "alice", "hello"),
            ],
            &nav(),
        );
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(!html.contains("<b>hi</b>"));
        assert!(html.contains("An anonymous person"));
        // Most recent first
        assert!(html.find("entry-2").unwrap() < html.find("entry-1").unwrap());
        assert!(html.contains("continue=%2F&amp;x=1"));
    }

    #[test]
    fn servers_page() {
        let servers = vec![
            ServerLink {
                instance_id: InstanceId::new("vm-1").unwrap(),
                url: Some(Url::parse("https://vm-1.example.com/guestbook").unwrap()),
            },
            ServerLink {
                instance_id: InstanceId::new("vm-2").unwrap(),
                url: None,
            },
        ];
        let html = PlainHtml.servers(&servers, false, &nav());
        assert!(html.contains("<a href=\"https://vm-1.example.com/guestbook\">vm-1</a>"));
        assert!(html.contains("<li>vm-2</li>"));
        assert!(!html.contains("unavailable"));
        assert!(PlainHtml.servers(&[], true, &nav()).contains("unavailable"));
    }
}
