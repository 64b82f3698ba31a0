//! Core domain types for bloodbank.
//!
//! Plain data structures shared by the storage layer, the business rules in
//! [`crate::service`] and the HTTP API. Lifecycle rules that only depend on
//! a record's own fields (eligibility, status transitions, lot expiry) live
//! next to the types.

mod appointment;
mod blood;
mod donor;
mod inventory;
mod notification;
mod report;
mod request;
mod user;

pub use appointment::{Appointment, AppointmentFilter, AppointmentStatus};
pub use blood::BloodGroup;
pub use donor::{Donor, DonorFilter, DonorUpdate, Eligibility, NewDonor};
pub use inventory::{
    Allocation, GroupStock, InventoryLot, InventorySummary, LedgerMismatch, LotFilter, LotSource,
    LotState, Movement, MovementReason, NewLot,
};
pub use notification::{Notification, NotificationResponse};
pub use report::{Attachment, MedicalReport, NewReport};
pub use request::{BloodRequest, NewRequest, RequestFilter, RequestStatus, Urgency};
pub use user::{NewUser, Role, User, UserStatus};
