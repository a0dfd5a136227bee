use eventsource_stream::Eventsource;
use futures_util::{future, StreamExt};
use reqwest::Response;
use tracing::trace;

use super::{FragmentStream, DONE_SENTINEL};
use crate::error::TransportError;

/// Check the status of `response`, mapping failures to [`TransportError`].
pub(crate) async fn ensure_success(
    response: Response,
    endpoint: &str,
) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 401 {
        return Err(TransportError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Turn a server-sent-event response into a fragment stream.
///
/// `parse` maps the data of one event to a fragment, an error, or nothing
/// (keep-alives, role-only deltas). The stream ends at `[DONE]`, after the
/// first error, or when the connection closes.
pub(crate) fn fragment_stream<F>(response: Response, mut parse: F) -> FragmentStream
where
    F: FnMut(&str) -> Option<Result<String, TransportError>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(event) if event.data.trim() == DONE_SENTINEL);
            future::ready(!done)
        })
        .filter_map(move |event| {
            let item = match event {
                Ok(event) => {
                    trace!(data = %event.data, "SSE event");
                    if event.data.trim().is_empty() {
                        None
                    } else {
                        parse(&event.data)
                    }
                }
                Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
            };
            future::ready(item)
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        });

    Box::pin(stream)
}
