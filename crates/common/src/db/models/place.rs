//! Canonical place entity (country, state/province, city)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gazetteer entity class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Country,
    State,
    City,
}

impl EntityClass {
    /// Every class, in priority order
    pub const ALL: [EntityClass; 3] = [EntityClass::Country, EntityClass::State, EntityClass::City];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Country => "country",
            EntityClass::State => "state",
            EntityClass::City => "city",
        }
    }

    /// Tie-break priority: country > state > city
    pub fn priority(&self) -> u8 {
        match self {
            EntityClass::Country => 3,
            EntityClass::State => 2,
            EntityClass::City => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "country" | "countries" => Some(EntityClass::Country),
            "state" | "states" | "province" => Some(EntityClass::State),
            "city" | "cities" => Some(EntityClass::City),
            _ => None,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "places")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    /// Canonical display form
    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// One of country, state, city
    #[sea_orm(column_type = "Text")]
    pub entity_class: String,

    /// ISO country code or administrative code (e.g. "IND", "GA")
    #[sea_orm(column_type = "Text", nullable)]
    pub code: Option<String>,

    /// Owning country; lookup only
    pub parent_country_id: Option<i64>,

    pub population: i64,

    pub latitude: f64,

    pub longitude: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::place_alias::Entity")]
    Aliases,
}

impl Related<super::place_alias::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Aliases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_round_trip() {
        for class in EntityClass::ALL {
            assert_eq!(EntityClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(EntityClass::parse("Cities"), Some(EntityClass::City));
        assert_eq!(EntityClass::parse("district"), None);
    }

    #[test]
    fn test_priority_order() {
        assert!(EntityClass::Country.priority() > EntityClass::State.priority());
        assert!(EntityClass::State.priority() > EntityClass::City.priority());
    }
}
