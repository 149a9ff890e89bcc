//! Worker referrals submitted by the public and worked by staff.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::nullable;
use crate::db::{Reference, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Contacted,
    Registered,
    Rejected,
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferralStatus::Pending => write!(f, "pending"),
            ReferralStatus::Contacted => write!(f, "contacted"),
            ReferralStatus::Registered => write!(f, "registered"),
            ReferralStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Referral {
    pub id: String,
    pub referrer_name: String,
    pub referrer_email: Option<String>,
    pub referrer_phone: Option<String>,
    pub referred_name: String,
    pub referred_email: Option<String>,
    pub referred_phone: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Resource for Referral {
    const TABLE: &'static str = "referrals";
    const ALIAS: &'static str = "r";
    const NAME: &'static str = "Referral";
    const SELECT: &'static str = "SELECT r.id, r.referrer_name, r.referrer_email, r.referrer_phone, \
         r.referred_name, r.referred_email, r.referred_phone, r.category_id, \
         c.name_en AS category_name, r.notes, r.status, r.created_at, r.updated_at \
         FROM referrals r LEFT JOIN categories c ON r.category_id = c.id";
    const REFERENCES: &'static [Reference] = &[Reference {
        column: "category_id",
        table: "categories",
        message: "Category does not exist",
    }];
}

/// Body shared by the public submission form and the admin create endpoint
#[derive(Debug, Default, Deserialize)]
pub struct CreateReferralRequest {
    pub referrer_name: Option<String>,
    pub referrer_email: Option<String>,
    pub referrer_phone: Option<String>,
    pub referred_name: Option<String>,
    pub referred_email: Option<String>,
    pub referred_phone: Option<String>,
    pub category_id: Option<String>,
    pub notes: Option<String>,
    /// Ignored on public submissions
    pub status: Option<ReferralStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReferralRequest {
    pub referrer_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub referrer_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub referrer_phone: Option<Option<String>>,
    pub referred_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub referred_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub referred_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub status: Option<ReferralStatus>,
}
