//! Extractors whose rejections are rendered as [`AppError`] bodies.

use axum::extract::{FromRequest, FromRequestParts};

use crate::web::error::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
