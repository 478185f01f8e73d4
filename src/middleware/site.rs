use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};

use crate::database::models::Site;
use crate::error::ApiError;
use crate::state::AppState;

const FORWARDED_HOST: &str = "x-forwarded-host";

/// The tenant a storefront request was addressed to
#[derive(Clone, Debug)]
pub struct CurrentSite(pub Site);

/// Raw inbound host: `X-Forwarded-Host` when trusted, then `Host`, then the URI authority
pub fn request_host(headers: &HeaderMap, uri: &Uri, trust_forwarded: bool) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if trust_forwarded {
        if let Some(host) = header_value(FORWARDED_HOST) {
            return Some(host);
        }
    }
    header_value(header::HOST.as_str()).or_else(|| uri.authority().map(|a| a.to_string()))
}

/// Resolve the site for the request host; all storefront routes sit behind this
pub async fn resolve_site_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let site = resolve_from_request(&state, request.headers(), request.uri()).await?;
    request.extensions_mut().insert(CurrentSite(site));
    Ok(next.run(request).await)
}

pub async fn resolve_from_request(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Result<Site, ApiError> {
    let host = request_host(headers, uri, state.config.site.trust_forwarded_host)
        .ok_or_else(|| ApiError::bad_request("Missing Host header"))?;

    let site = state
        .sites()
        .resolve_host(&host, state.config.site.default_domain.as_deref())
        .await?;
    tracing::debug!(site_id = %site.id, "Resolved host '{}'", host);
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn forwarded_host_wins_only_when_trusted() {
        let h = headers(&[("host", "internal:8080"), ("x-forwarded-host", "shop.example.com")]);
        let uri = Uri::from_static("/store/products");
        assert_eq!(request_host(&h, &uri, true).as_deref(), Some("shop.example.com"));
        assert_eq!(request_host(&h, &uri, false).as_deref(), Some("internal:8080"));
    }

    #[test]
    fn falls_back_to_uri_authority() {
        let uri = Uri::from_static("http://shop.example.com/store/products");
        assert_eq!(request_host(&HeaderMap::new(), &uri, true).as_deref(), Some("shop.example.com"));
        assert_eq!(request_host(&HeaderMap::new(), &Uri::from_static("/"), true), None);
    }
}
