//! Request classification.
//!
//! Every intercepted GET falls into exactly one class. The checks run in a
//! fixed order and the first match wins; a new class must be inserted into
//! this chain rather than layered on top of it.

use serde::Serialize;
use url::Url;

use super::request::WorkerRequest;

/// Traffic class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteClass {
    /// Same-origin `/api/*`; session and other live endpoints.
    ApiBypass,
    /// Any request carrying `forceNet=1`.
    ForceBypass,
    /// Published spreadsheet CSV export.
    SpreadsheetData,
    /// Top-level page navigation.
    Navigation,
    /// Same-origin sub-resource.
    SameOriginAsset,
    /// Everything else (CDNs and the like).
    OtherCrossOrigin,
}

/// Freshness policy applied to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NetworkOnly,
    StaleWhileRevalidate,
    NetworkFirst,
    CacheFirst,
    Passthrough,
}

impl RouteClass {
    pub fn strategy(self) -> Strategy {
        match self {
            RouteClass::ApiBypass | RouteClass::ForceBypass => Strategy::NetworkOnly,
            RouteClass::SpreadsheetData => Strategy::StaleWhileRevalidate,
            RouteClass::Navigation => Strategy::NetworkFirst,
            RouteClass::SameOriginAsset => Strategy::CacheFirst,
            RouteClass::OtherCrossOrigin => Strategy::Passthrough,
        }
    }

    /// Whether requests of this class may ever be answered from the cache.
    pub fn reads_cache(self) -> bool {
        matches!(self, RouteClass::SpreadsheetData | RouteClass::Navigation | RouteClass::SameOriginAsset)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::ApiBypass => "api-bypass",
            RouteClass::ForceBypass => "force-bypass",
            RouteClass::SpreadsheetData => "spreadsheet-data",
            RouteClass::Navigation => "navigation",
            RouteClass::SameOriginAsset => "same-origin-asset",
            RouteClass::OtherCrossOrigin => "other-cross-origin",
        }
    }
}

/// Classifies requests relative to the worker's origin.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    sheet_host: String,
}

impl Router {
    pub fn new(origin: Url, sheet_host: impl Into<String>) -> Self {
        Self { origin, sheet_host: sheet_host.into().to_ascii_lowercase() }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Classify a request; `None` means it is not intercepted (non-GET).
    pub fn classify(&self, request: &WorkerRequest) -> Option<RouteClass> {
        if !request.is_get() {
            return None;
        }

        let same_origin = request.is_same_origin(&self.origin);

        let class = if same_origin && request.url.path().starts_with("/api/") {
            RouteClass::ApiBypass
        } else if request.query_param("forceNet").as_deref() == Some("1") {
            RouteClass::ForceBypass
        } else if self.is_spreadsheet_export(request) {
            RouteClass::SpreadsheetData
        } else if request.navigate {
            RouteClass::Navigation
        } else if same_origin {
            RouteClass::SameOriginAsset
        } else {
            RouteClass::OtherCrossOrigin
        };

        Some(class)
    }

    fn is_spreadsheet_export(&self, request: &WorkerRequest) -> bool {
        request.url.host_str() == Some(self.sheet_host.as_str())
            && request.url.path().contains("/spreadsheets/")
            && request.query_param("output").as_deref() == Some("csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn router() -> Router {
        Router::new(Url::parse("https://portal.example").unwrap(), "docs.google.com")
    }

    fn get(url: &str) -> WorkerRequest {
        WorkerRequest::new(Method::GET, url).unwrap()
    }

    const SHEET: &str = "https://docs.google.com/spreadsheets/d/e/2PACX/pub?gid=0&single=true&output=csv";

    #[test]
    fn test_non_get_not_intercepted() {
        let request = WorkerRequest::new(Method::POST, "https://portal.example/api/session").unwrap();
        assert_eq!(router().classify(&request), None);

        let request = WorkerRequest::new(Method::HEAD, "https://portal.example/app.js").unwrap();
        assert_eq!(router().classify(&request), None);
    }

    #[test]
    fn test_api_bypass() {
        assert_eq!(router().classify(&get("https://portal.example/api/session")), Some(RouteClass::ApiBypass));
        let navigation = get("https://portal.example/api/logout").with_navigate(true);
        assert_eq!(router().classify(&navigation), Some(RouteClass::ApiBypass));
    }

    #[test]
    fn test_api_prefix_requires_same_origin() {
        assert_eq!(
            router().classify(&get("https://cdn.example/api/session")),
            Some(RouteClass::OtherCrossOrigin)
        );
        assert_eq!(router().classify(&get("https://portal.example/apis.js")), Some(RouteClass::SameOriginAsset));
    }

    #[test]
    fn test_force_bypass_beats_spreadsheet() {
        let url = format!("{SHEET}&forceNet=1");
        assert_eq!(router().classify(&get(&url)), Some(RouteClass::ForceBypass));
    }

    #[test]
    fn test_force_bypass_any_origin() {
        assert_eq!(router().classify(&get("https://portal.example/?forceNet=1")), Some(RouteClass::ForceBypass));
        assert_eq!(
            router().classify(&get("https://cdn.example/lib.js?forceNet=1")),
            Some(RouteClass::ForceBypass)
        );
        assert_eq!(
            router().classify(&get("https://portal.example/app.js?forceNet=0")),
            Some(RouteClass::SameOriginAsset)
        );
    }

    #[test]
    fn test_api_beats_force_bypass() {
        assert_eq!(
            router().classify(&get("https://portal.example/api/session?forceNet=1")),
            Some(RouteClass::ApiBypass)
        );
    }

    #[test]
    fn test_spreadsheet_data() {
        assert_eq!(router().classify(&get(SHEET)), Some(RouteClass::SpreadsheetData));
    }

    #[test]
    fn test_spreadsheet_requires_csv_output_and_path() {
        let html = "https://docs.google.com/spreadsheets/d/e/2PACX/pubhtml?output=html";
        assert_eq!(router().classify(&get(html)), Some(RouteClass::OtherCrossOrigin));

        let docs = "https://docs.google.com/document/d/x/export?output=csv";
        assert_eq!(router().classify(&get(docs)), Some(RouteClass::OtherCrossOrigin));

        let other_host = "https://sheets.example/spreadsheets/d/x/pub?output=csv";
        assert_eq!(router().classify(&get(other_host)), Some(RouteClass::OtherCrossOrigin));
    }

    #[test]
    fn test_spreadsheet_navigation_is_still_data() {
        assert_eq!(router().classify(&get(SHEET).with_navigate(true)), Some(RouteClass::SpreadsheetData));
    }

    #[test]
    fn test_navigation() {
        let request = get("https://portal.example/prof/").with_navigate(true);
        assert_eq!(router().classify(&request), Some(RouteClass::Navigation));

        let cross_origin = get("https://accounts.example/signin").with_navigate(true);
        assert_eq!(router().classify(&cross_origin), Some(RouteClass::Navigation));
    }

    #[test]
    fn test_same_origin_asset_and_cross_origin() {
        assert_eq!(router().classify(&get("https://portal.example/app.js")), Some(RouteClass::SameOriginAsset));
        assert_eq!(
            router().classify(&get("http://portal.example/app.js")),
            Some(RouteClass::OtherCrossOrigin)
        );
        assert_eq!(
            router().classify(&get("https://fonts.example/inter.woff2")),
            Some(RouteClass::OtherCrossOrigin)
        );
    }

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(RouteClass::ApiBypass.strategy(), Strategy::NetworkOnly);
        assert_eq!(RouteClass::ForceBypass.strategy(), Strategy::NetworkOnly);
        assert_eq!(RouteClass::SpreadsheetData.strategy(), Strategy::StaleWhileRevalidate);
        assert_eq!(RouteClass::Navigation.strategy(), Strategy::NetworkFirst);
        assert_eq!(RouteClass::SameOriginAsset.strategy(), Strategy::CacheFirst);
        assert_eq!(RouteClass::OtherCrossOrigin.strategy(), Strategy::Passthrough);
    }

    #[test]
    fn test_bypass_classes_never_read_cache() {
        assert!(!RouteClass::ApiBypass.reads_cache());
        assert!(!RouteClass::ForceBypass.reads_cache());
        assert!(!RouteClass::OtherCrossOrigin.reads_cache());
        assert!(RouteClass::Navigation.reads_cache());
    }
}
