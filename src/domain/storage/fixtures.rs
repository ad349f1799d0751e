//! Test entity shared by unit tests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, FieldName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub code: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: EntityId,
    pub puuid: String,
    pub symbol: String,
    pub quantity: i64,
    pub active: bool,
    #[serde(default)]
    pub warehouse: Option<Warehouse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockDraft {
    pub puuid: String,
    pub symbol: String,
    pub quantity: i64,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<Warehouse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StockPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockField {
    Puuid,
    Symbol,
    Quantity,
    Active,
}

impl FieldName for StockField {
    fn name(&self) -> &'static str {
        match self {
            Self::Puuid => "puuid",
            Self::Symbol => "symbol",
            Self::Quantity => "quantity",
            Self::Active => "active",
        }
    }

    fn all() -> &'static [Self] {
        &[Self::Puuid, Self::Symbol, Self::Quantity, Self::Active]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockRelation {
    Warehouse,
}

impl FieldName for StockRelation {
    fn name(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
        }
    }

    fn all() -> &'static [Self] {
        &[Self::Warehouse]
    }
}

impl Entity for Stock {
    const MODEL: &'static str = "stock";

    type Field = StockField;
    type Relation = StockRelation;
    type Draft = StockDraft;
    type Patch = StockPatch;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn unique_fields() -> &'static [StockField] {
        &[StockField::Puuid]
    }
}

pub fn draft(puuid: &str, symbol: &str, quantity: i64) -> StockDraft {
    StockDraft {
        puuid: puuid.to_string(),
        symbol: symbol.to_string(),
        quantity,
        active: true,
        warehouse: None,
    }
}

pub fn quantity_patch(quantity: i64) -> StockPatch {
    StockPatch {
        quantity: Some(quantity),
        ..Default::default()
    }
}
