//! Labour profiles: the workers customers can book.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nullable;
use crate::db::{Dependent, Reference, Resource, UniqueKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabourStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for LabourStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabourStatus::Pending => write!(f, "pending"),
            LabourStatus::Approved => write!(f, "approved"),
            LabourStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LabourProfile {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub category_name: Option<String>,
    pub city: String,
    pub phone: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub experience_years: i64,
    pub rating: f64,
    pub hourly_rate: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Resource for LabourProfile {
    const TABLE: &'static str = "labour_profiles";
    const ALIAS: &'static str = "lp";
    const NAME: &'static str = "Labour profile";
    const SELECT: &'static str = "SELECT lp.id, lp.name, lp.category_id, c.name_en AS category_name, \
         lp.city, lp.phone, lp.email, lp.description, lp.experience_years, lp.rating, \
         lp.hourly_rate, lp.status, lp.created_at, lp.updated_at \
         FROM labour_profiles lp LEFT JOIN categories c ON lp.category_id = c.id";
    const UNIQUE: &'static [UniqueKey] = &[UniqueKey {
        column: "phone",
        message: "Labour profile with this phone number already exists",
    }];
    const REFERENCES: &'static [Reference] = &[Reference {
        column: "category_id",
        table: "categories",
        message: "Category does not exist",
    }];
    const DEPENDENTS: &'static [Dependent] = &[Dependent {
        table: "bookings",
        column: "labour_id",
        message: "Cannot delete labour profile with existing bookings",
    }];
}

#[derive(Debug, Deserialize)]
pub struct CreateLabourRequest {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub experience_years: Option<i64>,
    pub rating: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub status: Option<LabourStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLabourRequest {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub experience_years: Option<i64>,
    pub rating: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub status: Option<LabourStatus>,
}

/// Query string of the public labour directory
#[derive(Debug, Default, Deserialize)]
pub struct LabourSearchParams {
    pub category_id: Option<String>,
    pub city: Option<String>,
    pub q: Option<String>,
    /// `rating` for top rated first; newest first otherwise
    pub sort: Option<String>,
    pub limit: Option<u32>,
}
