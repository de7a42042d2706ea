use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Appends `Link: <{endpoint}>; rel="webmention"` to every `text/*`
/// response, so clients discover this server's own receiving endpoint from
/// any page it serves. Mirrors `append_link_header`/
/// `webmention_link_header_value` from the original adapters.
pub async fn advertise_endpoint(endpoint: String, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let is_text = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.split(';').next().unwrap_or("").trim().starts_with("text/"))
        .unwrap_or(false);

    if !is_text {
        return response;
    }

    let to_add = format!("<{endpoint}>; rel=\"webmention\"");
    let value = match response.headers().get(axum::http::header::LINK) {
        Some(existing) => match existing.to_str() {
            Ok(existing) if existing.contains(&to_add) => existing.to_string(),
            Ok(existing) => format!("{existing}, {to_add}"),
            Err(_) => to_add,
        },
        None => to_add,
    };

    if let Ok(header_value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(axum::http::header::LINK, header_value);
    }

    response
}
