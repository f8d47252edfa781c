use conduit_config::{AnyOrArray, CorsConfig};
use http::Method;
use http::header::HeaderName;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Build a Tower CORS layer from the configured allow-list
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = match &config.origins {
        AnyOrArray::Any => CorsLayer::new().allow_origin(AllowOrigin::any()),
        AnyOrArray::List(origins) => CorsLayer::new().allow_origin(parse_all::<http::HeaderValue>(origins)),
    };

    layer = match &config.methods {
        AnyOrArray::Any => layer.allow_methods(AllowMethods::any()),
        AnyOrArray::List(methods) => layer.allow_methods(parse_all::<Method>(methods)),
    };

    layer = match &config.headers {
        AnyOrArray::Any => layer.allow_headers(AllowHeaders::any()),
        AnyOrArray::List(headers) => layer.allow_headers(parse_all::<HeaderName>(headers)),
    };

    if !config.expose_headers.is_empty() {
        layer = layer.expose_headers(parse_all::<HeaderName>(&config.expose_headers));
    }

    if config.credentials {
        layer = layer.allow_credentials(true);
    }

    if let Some(max_age) = config.max_age {
        layer = layer.max_age(max_age);
    }

    layer
}

/// Parse every entry, skipping (and logging) the ones that do not parse
fn parse_all<T: std::str::FromStr>(values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = value.parse().ok();
            if parsed.is_none() {
                tracing::warn!(%value, "ignoring unparseable CORS entry");
            }
            parsed
        })
        .collect()
}
