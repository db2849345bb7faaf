use serde::{Deserialize, Serialize};

/// Django REST framework page envelope.
///
/// Views with pagination disabled still wrap results as `{"results": [...]}`
/// without the counters, so those fields default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct PaginatedResponse<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}

impl<T> Default for PaginatedResponse<T> {
    fn default() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

/// Catalogue endpoints answer either a bare array or a page, depending on
/// whether pagination is enabled server-side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Items(Vec<T>),
    Page(PaginatedResponse<T>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Items(items) => items,
            Listing::Page(page) => page.results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_accepts_both_shapes() {
        let bare: Listing<u32> = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(bare.into_vec(), vec![1, 2, 3]);

        let page: Listing<u32> = serde_json::from_str(
            r#"{"count": 2, "next": null, "previous": null, "results": [4, 5]}"#,
        )
        .unwrap();
        assert_eq!(page.into_vec(), vec![4, 5]);

        let unpaginated: Listing<u32> = serde_json::from_str(r#"{"results": [6]}"#).unwrap();
        assert_eq!(unpaginated.into_vec(), vec![6]);
    }

    #[test]
    fn test_page_navigation() {
        let page: PaginatedResponse<u32> = serde_json::from_str(
            r#"{"count": 40,
                "next": "http://localhost:8001/api/repairs/repairs/?page=3",
                "previous": "http://localhost:8001/api/repairs/repairs/?page=1",
                "results": []}"#,
        )
        .unwrap();
        assert!(page.has_next());
        assert!(page.has_previous());
        assert!(!PaginatedResponse::<u32>::default().has_next());
    }
}
