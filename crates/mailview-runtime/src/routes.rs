#![forbid(unsafe_code)]

//! Server endpoint layout.
//!
//! | stream | path |
//! |--------|------|
//! | one page of mail | `/mails/{account}?offset=&limit=&sorts=` |
//! | incremental sync | `/mails/sync/{account}` |
//! | mailbox list | `/mailboxes/{account}` |
//!
//! Page parameters match the server's email query: `offset`, `limit` and
//! `sorts` are always sent, `mailboxId` and `searchKeyword` only when the
//! filter sets them. `sorts` is required by the server, so an unsorted filter
//! still sends `[]`; its value is the JSON array of sort keys:
//!
//! ```text
//! /mails/acc?offset=50&limit=50&mailboxId=inbox&sorts=[{"column":"Date","asc":false}]
//! ```
//!
//! Only plain `ws` (or `http`) bases are accepted. The transport has no TLS.

use mailview_core::PageQuery;
use url::Url;

use crate::transport::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}; expected ws or http")]
    UnsupportedScheme(String),

    #[error("base URL {0} cannot carry a path")]
    CannotBeABase(String),

    #[error("account id must not be empty")]
    EmptyAccount,
}

/// Endpoint builder for one account on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    base: Url,
    account_id: String,
}

impl Routes {
    /// `http` bases are rewritten to `ws`. `wss`/`https` are rejected.
    pub fn new(base: &str, account_id: impl Into<String>) -> Result<Self, RouteError> {
        let account_id = account_id.into();
        if account_id.trim().is_empty() {
            return Err(RouteError::EmptyAccount);
        }

        let mut base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(RouteError::CannotBeABase(base.to_string()));
        }
        let scheme = base.scheme().to_owned();
        match scheme.as_str() {
            "ws" => {}
            "http" => base
                .set_scheme("ws")
                .map_err(|()| RouteError::UnsupportedScheme(scheme.clone()))?,
            _ => return Err(RouteError::UnsupportedScheme(scheme)),
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base, account_id })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Stream of one page of list items.
    #[must_use]
    pub fn page_endpoint(&self, query: &PageQuery) -> Endpoint {
        let filter = &query.filter;
        // A list of plain derived structs always serializes.
        let sorts = serde_json::to_string(&filter.sorts).unwrap_or_else(|_| "[]".to_owned());

        let mut url = self.join(&["mails", &self.account_id]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("offset", &query.offset.to_string())
                .append_pair("limit", &query.limit.to_string());
            if let Some(mailbox) = &filter.mailbox_id {
                pairs.append_pair("mailboxId", mailbox);
            }
            if let Some(keyword) = &filter.search_keyword {
                pairs.append_pair("searchKeyword", keyword);
            }
            pairs.append_pair("sorts", &sorts);
        }
        Endpoint::new(url)
    }

    /// Incremental sync stream for the account.
    #[must_use]
    pub fn sync_endpoint(&self) -> Endpoint {
        Endpoint::new(self.join(&["mails", "sync", &self.account_id]))
    }

    /// Mailbox list stream for the account.
    #[must_use]
    pub fn mailboxes_endpoint(&self) -> Endpoint {
        Endpoint::new(self.join(&["mailboxes", &self.account_id]))
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailview_core::{ListFilter, SortSpec};

    fn routes() -> Routes {
        Routes::new("http://localhost:8080/api/", "acc-1").unwrap()
    }

    fn params(endpoint: &Endpoint) -> Vec<(String, String)> {
        endpoint
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn http_base_becomes_ws() {
        let r = routes();
        assert_eq!(r.base().scheme(), "ws");
        let r = Routes::new("ws://mail.example.com", "a").unwrap();
        assert_eq!(r.base().scheme(), "ws");
    }

    #[test]
    fn tls_bases_are_rejected() {
        for base in ["https://mail.example.com", "wss://mail.example.com"] {
            let error = Routes::new(base, "a").unwrap_err();
            assert!(matches!(error, RouteError::UnsupportedScheme(_)), "{base}");
        }
    }

    #[test]
    fn rejects_bad_bases() {
        assert!(matches!(
            Routes::new("ftp://x", "a"),
            Err(RouteError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Routes::new("mailto:a@b", "a"),
            Err(RouteError::CannotBeABase(_))
        ));
        assert!(matches!(
            Routes::new("ws://x", " "),
            Err(RouteError::EmptyAccount)
        ));
        assert!(matches!(
            Routes::new("::", "a"),
            Err(RouteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn page_endpoint_for_mailbox() {
        let filter = ListFilter::mailbox("inbox")
            .with_search("invoice")
            .with_sorts(vec![SortSpec::newest_first()]);
        let endpoint = routes().page_endpoint(&PageQuery::for_page(2, 50, &filter));
        assert_eq!(endpoint.url().path(), "/api/mails/acc-1");
        assert_eq!(
            params(&endpoint),
            [
                ("offset".to_owned(), "100".to_owned()),
                ("limit".to_owned(), "50".to_owned()),
                ("mailboxId".to_owned(), "inbox".to_owned()),
                ("searchKeyword".to_owned(), "invoice".to_owned()),
                (
                    "sorts".to_owned(),
                    r#"[{"column":"Date","asc":false}]"#.to_owned()
                ),
            ]
        );
    }

    #[test]
    fn page_endpoint_without_mailbox() {
        let endpoint = routes().page_endpoint(&PageQuery::for_page(0, 10, &ListFilter::default()));
        assert_eq!(
            endpoint.as_str(),
            "ws://localhost:8080/api/mails/acc-1?offset=0&limit=10&sorts=%5B%5D"
        );
    }

    #[test]
    fn sorts_decode_back_to_the_filter() {
        let filter = ListFilter::mailbox("inbox");
        let endpoint = routes().page_endpoint(&PageQuery::for_page(0, 10, &filter));
        let (_, sorts) = params(&endpoint)
            .into_iter()
            .find(|(k, _)| k == "sorts")
            .unwrap();
        let decoded: Vec<SortSpec> = serde_json::from_str(&sorts).unwrap();
        assert_eq!(decoded, filter.sorts);
    }

    #[test]
    fn mailbox_is_a_parameter_not_a_segment() {
        let q = PageQuery::for_page(0, 10, &ListFilter::mailbox("a/b c"));
        let endpoint = routes().page_endpoint(&q);
        assert_eq!(endpoint.url().path(), "/api/mails/acc-1");
        assert!(
            params(&endpoint).contains(&("mailboxId".to_owned(), "a/b c".to_owned()))
        );
    }

    #[test]
    fn account_segment_is_escaped() {
        let r = Routes::new("http://localhost:8080", "a/b").unwrap();
        assert_eq!(
            r.sync_endpoint().as_str(),
            "ws://localhost:8080/mails/sync/a%2Fb"
        );
    }

    #[test]
    fn sync_and_mailbox_endpoints() {
        let r = routes();
        assert_eq!(
            r.sync_endpoint().as_str(),
            "ws://localhost:8080/api/mails/sync/acc-1"
        );
        assert_eq!(
            r.mailboxes_endpoint().as_str(),
            "ws://localhost:8080/api/mailboxes/acc-1"
        );
    }
}
