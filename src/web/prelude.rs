pub(crate) use crate::error::GatewayError;
pub(crate) use crate::model::iso_timestamp;
pub(crate) use crate::web::AppState;
pub(crate) use axum::Json;
pub(crate) use axum::extract::State;
pub(crate) use axum::extract::rejection::JsonRejection;
pub(crate) use serde::Deserialize;
pub(crate) use serde_json::{Value, json};
pub(crate) use tracing::{debug, info};
