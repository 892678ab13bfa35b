use crate::decode::ResponseDecoder;
use crate::error::{DecodeError, HttpError};
use crate::response::{ResponseBody, ResponseHead, decode_body};
use crate::transport::{Request, Transport};
use serde::de::DeserializeOwned;

/// Send `request` and decode the response body into the target matching its
/// status: `success` for 2xx, `failure` otherwise.
///
/// The body is released exactly once on every path. A `None` target leaves
/// the body unread; non-2xx statuses are not errors by themselves.
pub(crate) async fn exchange<S, F>(
    transport: &dyn Transport,
    decoder: ResponseDecoder,
    request: Request,
    success: Option<&mut S>,
    failure: Option<&mut F>,
) -> Result<ResponseHead, HttpError>
where
    S: DeserializeOwned,
    F: DeserializeOwned,
{
    tracing::debug!(method = %request.method(), url = %request.uri(), "sending request");

    let (parts, body) = transport.execute(request).await?.into_parts();
    let head = ResponseHead::from(parts);
    tracing::trace!(status = %head.status(), "response received");

    let decoded = if head.is_success() {
        decode_into(decoder, body, success).await
    } else {
        decode_into(decoder, body, failure).await
    };

    match decoded {
        Ok(()) => Ok(head),
        Err(source) => Err(HttpError::Decode {
            head: Box::new(head),
            source,
        }),
    }
}

async fn decode_into<T: DeserializeOwned>(
    decoder: ResponseDecoder,
    body: ResponseBody,
    target: Option<&mut T>,
) -> Result<(), DecodeError> {
    if let Some(target) = target {
        *target = decode_body(decoder, body).await?;
    }
    Ok(())
}
