//! Execute a built request and normalize what comes back.
//!
//! Transport failures never surface as `Err`: they are classified and turned
//! into a synthesized [`Response`]. A body that cannot be read after the
//! headers arrived is the one exception on the direct path.

use crate::error::{classify, Error, Result};
use crate::request::BuiltRequest;
use crate::response::Response;

/// Send `request` and normalize the result.
///
/// Returns `Err(Error::BodyRead)` only when the response body could not be read.
pub async fn dispatch(request: BuiltRequest) -> Result<Response> {
    let BuiltRequest {
        id,
        request,
        client,
    } = request;
    let method = request.method.clone();
    let url = request.url.clone();

    let raw = match client.send(request).await {
        Ok(raw) => raw,
        Err(err) => {
            let class = classify(&err);
            tracing::warn!(
                request_id = %id,
                method = %method,
                url = %url,
                status = class.status,
                error = %err,
                "Request failed"
            );
            return Ok(Response::failure(id, class, &err));
        }
    };

    let status = raw.status;
    let headers = raw.headers;
    let body = raw.body.await.map_err(|e| match e {
        Error::BodyRead(_) => e,
        other => Error::body_read(other.to_string()),
    })?;

    tracing::debug!(
        request_id = %id,
        status = status,
        final_url = %raw.url,
        bytes = body.len(),
        "Response received"
    );
    Ok(Response::normalize(id, status, &headers, &body))
}

/// Like [`dispatch`], but a body read failure also becomes a synthesized response.
pub async fn dispatch_or_synthesize(request: BuiltRequest) -> Response {
    let id = request.id.clone();
    match dispatch(request).await {
        Ok(response) => response,
        Err(err) => {
            let class = classify(&err);
            tracing::warn!(request_id = %id, status = class.status, error = %err, "Response body lost");
            Response::failure(id, class, &err)
        }
    }
}
