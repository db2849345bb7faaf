use std::fmt;

use serde::{Deserialize, Serialize};

use super::inventory::ProductModel;
use super::user::User;

/// Workshop status of a repair ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum RepairStatus {
    /// Registered, not started
    #[default]
    Saisie,
    EnCours,
    /// Ready for pickup
    Prete,
    /// Waiting on a part or the client
    EnAttente,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 4] = [
        RepairStatus::Saisie,
        RepairStatus::EnCours,
        RepairStatus::Prete,
        RepairStatus::EnAttente,
    ];

    /// Wire value, also used as the `status` list filter
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Saisie => "saisie",
            RepairStatus::EnCours => "en-cours",
            RepairStatus::Prete => "prete",
            RepairStatus::EnAttente => "en-attente",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RepairStatus::Saisie => "Saisie",
            RepairStatus::EnCours => "En cours",
            RepairStatus::Prete => "Prête",
            RepairStatus::EnAttente => "En attente",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repair ticket as returned by `/repairs/repairs/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Repair {
    pub id: i64,
    pub uid: String,
    pub date: String,
    #[serde(default, rename = "scheduledDate")]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub accessories: Option<String>,
    pub client: User,
    #[serde(default)]
    pub product_model: Option<ProductModel>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub card_payment: String,
    #[serde(default)]
    pub cash_payment: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub device_photo: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub status: RepairStatus,
    /// Issue names
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "deviceType")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Repair {
    /// "Apple iPhone 12", or whatever part of it is known
    pub fn device_display(&self) -> String {
        match (self.brand.as_deref(), self.model.as_deref()) {
            (Some(brand), Some(model)) => format!("{} {}", brand, model),
            (Some(only), None) | (None, Some(only)) => only.to_string(),
            (None, None) => "Unknown device".to_string(),
        }
    }
}

/// Body for `POST /repairs/repairs/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct NewRepair {
    pub uid: String,
    pub date: String,
    pub client_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_model_id: Option<i64>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub price: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issue_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessories: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// PATCH body for a repair; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct RepairUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RepairStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_payment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_payment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "scheduledDate", skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
}
