//! Payment domain errors and their HTTP mapping.

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Booking {0} is already paid")]
    AlreadyPaid(String),

    #[error("Insufficient wallet balance")]
    InsufficientBalance,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("OTP has expired, request a new one")]
    OtpExpired,

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment gateway is not configured")]
    GatewayUnavailable,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Refund failed: {0}")]
    Refund(String),

    #[error("Payment method {0} is not supported for this operation")]
    UnsupportedPaymentMethod(String),

    #[error("Payment {payment_id} was not applied to booking {booking_id} and has been refunded")]
    CaptureReturned {
        booking_id: String,
        payment_id: String,
    },

    #[error("Booking {0} was modified concurrently, retry the request")]
    Conflict(String),

    #[error("Storage error")]
    Storage(#[source] anyhow::Error),
}

impl PaymentError {
    pub fn storage(context: &str, err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, context, "Storage operation failed");
        PaymentError::Storage(err.context(context.to_string()))
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::Validation(_)
            | PaymentError::InvalidOtp
            | PaymentError::OtpExpired
            | PaymentError::InvalidSignature
            | PaymentError::UnsupportedPaymentMethod(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            PaymentError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            PaymentError::AlreadyPaid(_)
            | PaymentError::Conflict(_)
            | PaymentError::CaptureReturned { .. } => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            PaymentError::InsufficientBalance => {
                AppError::PaymentRequired(anyhow::anyhow!(message))
            }
            PaymentError::GatewayUnavailable => AppError::ServiceUnavailable,
            PaymentError::Gateway(_) | PaymentError::Refund(_) => AppError::BadGateway(message),
            PaymentError::Storage(source) => AppError::DatabaseError(source),
        }
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
