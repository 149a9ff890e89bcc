//! Service categories, stored with English and Urdu text.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nullable;
use crate::db::{Dependent, Resource, UniqueKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryStatus::Active => write!(f, "active"),
            CategoryStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub name_urdu: Option<String>,
    pub description: Option<String>,
    pub description_urdu: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Resource for Category {
    const TABLE: &'static str = "categories";
    const ALIAS: &'static str = "c";
    const NAME: &'static str = "Category";
    const SELECT: &'static str = "SELECT c.id, c.name_en AS name, c.name_ur AS name_urdu, \
         c.description_en AS description, c.description_ur AS description_urdu, \
         c.status, c.created_at, c.updated_at FROM categories c";
    const UNIQUE: &'static [UniqueKey] = &[UniqueKey {
        column: "name_en",
        message: "Category with this name already exists",
    }];
    const DEPENDENTS: &'static [Dependent] = &[
        Dependent {
            table: "labour_profiles",
            column: "category_id",
            message: "Cannot delete category that is being used by labour profiles or bookings",
        },
        Dependent {
            table: "bookings",
            column: "category_id",
            message: "Cannot delete category that is being used by labour profiles or bookings",
        },
        Dependent {
            table: "referrals",
            column: "category_id",
            message: "Cannot delete category that is referenced by referrals",
        },
    ];
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    pub name_urdu: Option<String>,
    pub description: Option<String>,
    pub description_urdu: Option<String>,
    pub status: Option<CategoryStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub name_urdu: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description_urdu: Option<Option<String>>,
    pub status: Option<CategoryStatus>,
}
