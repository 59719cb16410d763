//! List query parameters.

use crate::EntityKind;

/// Filters accepted by the list endpoints. Unset, zero and empty values are
/// left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    /// Users only.
    pub role: Option<String>,
}

impl ListQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// `page=2&limit=20&search=...`, percent-encoded, in a fixed order.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let numbers = [("page", self.page), ("limit", self.limit)]
            .into_iter()
            .filter_map(|(name, n)| n.filter(|n| *n > 0).map(|n| (name, n.to_string())));
        let texts = [
            ("search", &self.search),
            ("role", &self.role),
            ("status", &self.status),
        ]
        .into_iter()
        .filter_map(|(name, s)| {
            s.as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| (name, urlencoding::encode(s).into_owned()))
        });
        numbers
            .chain(texts)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The collection path for `kind` with this query appended.
    #[must_use]
    pub fn path(&self, kind: EntityKind) -> String {
        let query = self.to_query_string();
        if query.is_empty() {
            kind.collection_path().to_string()
        } else {
            format!("{}?{query}", kind.collection_path())
        }
    }
}
