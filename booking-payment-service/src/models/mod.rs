pub mod booking;
pub mod money;
pub mod otp;
pub mod wallet;

pub use booking::{
    Booking, BookingStatus, ExtraCharge, NewBooking, PaymentMethod, PaymentStatus,
    ReturnedCapture, SettlementStatus, WorkerPaymentStatus,
};
pub use money::{to_major, to_minor, DEFAULT_CURRENCY};
pub use otp::OtpChallenge;
pub use wallet::{
    SettlementRecord, TopupOrder, TopupStatus, UserWallet, VendorLedger, WalletEntryKind,
    WalletReason, WalletTransaction,
};
