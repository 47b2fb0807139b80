use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use futures_util::StreamExt;

use crate::error::ApiError;

/// Largest text field accepted from a multipart body.
const FIELD_LIMIT: usize = 64 * 1024;

/// The flat fields of a POST body, sent either urlencoded or as
/// `multipart/form-data`. File parts of a multipart body are skipped.
#[derive(Debug, Default)]
pub(crate) struct SubmittedForm(pub HashMap<String, String>);

impl SubmittedForm {
    pub(crate) fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| {
            value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data")
        })
}

async fn read_text_fields(mut multipart: Multipart) -> Result<SubmittedForm, ApiError> {
    let mut fields = HashMap::new();

    while let Some(part) = multipart.next().await {
        let mut part = part.map_err(|e| ApiError::MalformedPayload(e.to_string()))?;
        let is_file = part.content_disposition().get_filename().is_some();
        let name = part.name().to_string();

        let mut value = Vec::new();
        while let Some(chunk) = part.next().await {
            let chunk = chunk.map_err(|e| ApiError::MalformedPayload(e.to_string()))?;
            if is_file {
                continue;
            }
            if value.len() + chunk.len() > FIELD_LIMIT {
                return Err(ApiError::MalformedPayload(format!("field {name} is too large")));
            }
            value.extend_from_slice(&chunk);
        }

        if is_file {
            log::debug!("skipping file part {name}");
            continue;
        }
        let value = String::from_utf8(value)
            .map_err(|_| ApiError::MalformedPayload(format!("field {name} is not valid UTF-8")))?;
        fields.insert(name, value);
    }

    Ok(SubmittedForm(fields))
}

impl FromRequest for SubmittedForm {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        if is_multipart(req) {
            let multipart = Multipart::new(req.headers(), payload.take());
            Box::pin(async move { Ok(read_text_fields(multipart).await?) })
        } else {
            let form = web::Form::<HashMap<String, String>>::from_request(req, payload);
            Box::pin(async move { Ok(SubmittedForm(form.await?.into_inner())) })
        }
    }
}
