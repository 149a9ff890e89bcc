//! Bookings of a labour profile by a customer.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nullable;
use crate::db::{Reference, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Whether the customer may still cancel
    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::InProgress => write!(f, "in_progress"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "in_progress" => Ok(BookingStatus::InProgress),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Unknown booking status: {}", s)),
        }
    }
}

/// Booking joined with customer, labour and category names
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub labour_id: Option<String>,
    pub labour_name: Option<String>,
    pub category_id: String,
    pub category_name: Option<String>,
    pub status: String,
    pub scheduled_date: String,
    pub amount: f64,
    pub description: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Booking {
    pub fn status_enum(&self) -> Option<BookingStatus> {
        self.status.parse().ok()
    }
}

impl Resource for Booking {
    const TABLE: &'static str = "bookings";
    const ALIAS: &'static str = "b";
    const NAME: &'static str = "Booking";
    const SELECT: &'static str = "SELECT b.id, b.customer_id, u.name AS customer_name, \
         u.email AS customer_email, b.labour_id, lp.name AS labour_name, b.category_id, \
         c.name_en AS category_name, b.status, b.scheduled_date, b.amount, b.description, \
         b.address, b.created_at, b.updated_at \
         FROM bookings b \
         LEFT JOIN users u ON b.customer_id = u.id \
         LEFT JOIN labour_profiles lp ON b.labour_id = lp.id \
         LEFT JOIN categories c ON b.category_id = c.id";
    const REFERENCES: &'static [Reference] = &[
        Reference {
            column: "customer_id",
            table: "users",
            message: "Customer does not exist",
        },
        Reference {
            column: "labour_id",
            table: "labour_profiles",
            message: "Labour profile does not exist",
        },
        Reference {
            column: "category_id",
            table: "categories",
            message: "Category does not exist",
        },
    ];
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: Option<String>,
    pub labour_id: Option<String>,
    pub category_id: Option<String>,
    pub scheduled_date: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub customer_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub labour_id: Option<Option<String>>,
    pub category_id: Option<String>,
    pub scheduled_date: Option<String>,
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    pub status: Option<BookingStatus>,
}

/// Booking placed by the signed-in customer
#[derive(Debug, Deserialize)]
pub struct CustomerBookingRequest {
    pub labour_id: Option<String>,
    pub category_id: Option<String>,
    pub scheduled_date: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
}
