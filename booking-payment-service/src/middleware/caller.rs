//! Caller identity forwarded by the upstream auth layer.
//!
//! `X-User-ID` identifies a customer and `X-Vendor-ID` a vendor. The headers
//! are trusted as-is; authentication happens before requests reach this service.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

use crate::models::Booking;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const VENDOR_ID_HEADER: &str = "x-vendor-id";

#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub user_id: Option<String>,
    pub vendor_id: Option<String>,
}

impl CallerContext {
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-User-ID header")))
    }

    pub fn require_vendor(&self) -> Result<&str, AppError> {
        self.vendor_id
            .as_deref()
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-Vendor-ID header")))
    }

    /// The booking's customer. Other callers get `NotFound`.
    pub fn ensure_customer(&self, booking: &Booking) -> Result<(), AppError> {
        if self.require_user()? != booking.user_id {
            return Err(booking_not_found(booking));
        }
        Ok(())
    }

    /// The booking's vendor. Other callers get `NotFound`.
    pub fn ensure_vendor(&self, booking: &Booking) -> Result<(), AppError> {
        if self.require_vendor()? != booking.vendor_id {
            return Err(booking_not_found(booking));
        }
        Ok(())
    }

    /// Either party to the booking.
    pub fn ensure_party(&self, booking: &Booking) -> Result<(), AppError> {
        let is_customer = self.user_id.as_deref() == Some(booking.user_id.as_str());
        let is_vendor = self.vendor_id.as_deref() == Some(booking.vendor_id.as_str());
        if self.user_id.is_none() && self.vendor_id.is_none() {
            return Err(AppError::AuthError(anyhow::anyhow!(
                "Missing X-User-ID or X-Vendor-ID header"
            )));
        }
        if !is_customer && !is_vendor {
            return Err(booking_not_found(booking));
        }
        Ok(())
    }
}

fn booking_not_found(booking: &Booking) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Booking {} not found", booking.id))
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = CallerContext {
            user_id: header(parts, USER_ID_HEADER),
            vendor_id: header(parts, VENDOR_ID_HEADER),
        };

        let span = tracing::Span::current();
        if let Some(ref uid) = caller.user_id {
            span.record("user_id", uid.as_str());
        }
        if let Some(ref vid) = caller.vendor_id {
            span.record("vendor_id", vid.as_str());
        }

        Ok(caller)
    }
}
