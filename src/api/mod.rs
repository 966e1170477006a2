pub mod auth;
pub mod catalog;
pub mod library;
pub mod types;

use axum::http::StatusCode;

use crate::db::DbError;
use crate::library::ServiceError;

pub(crate) fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ServiceError::Store(DbError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Store(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Store(DbError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
