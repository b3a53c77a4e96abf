//! Request extractors whose rejections render as the API error envelope.

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{header, request::Parts, StatusCode},
    Form, Json,
};
use serde::de::DeserializeOwned;

/// A request body accepted as JSON or as a urlencoded form.
#[derive(Debug)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(form_rejection)?;
            return Ok(Payload(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        Ok(Payload(value))
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
        StatusCode::UNPROCESSABLE_ENTITY => AppError::unprocessable(rejection.body_text()),
        _ => AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text())),
    }
}

fn form_rejection(rejection: FormRejection) -> AppError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
        _ => AppError::unprocessable(rejection.body_text()),
    }
}

/// Query string parameters.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| {
                AppError::BadRequest(format!("Invalid query parameters: {}", rejection.body_text()))
            })?;
        Ok(ApiQuery(value))
    }
}

/// Parses a path id. Anything but a positive integer is rejected with
/// `Invalid <what> ID`.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::unprocessable(format!("Invalid {} ID", what)))
}

/// Serde helpers for boolean flags sent as `true`, `1`, `"0"` or `"false"`.
pub mod flag {
    use core_types::validation::parse_flag;
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawFlag>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawFlag::Bool(value)) => Ok(Some(value)),
            Some(RawFlag::Int(0)) => Ok(Some(false)),
            Some(RawFlag::Int(1)) => Ok(Some(true)),
            Some(RawFlag::Int(other)) => Err(D::Error::custom(format!("invalid flag value {}", other))),
            Some(RawFlag::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(RawFlag::Text(text)) => parse_flag(&text)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid flag value '{}'", text))),
        }
    }
}
