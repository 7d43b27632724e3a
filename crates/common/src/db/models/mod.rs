//! SeaORM entity models
//!
//! Gazetteer tables. Populated by the ingestion jobs, read-only here.

mod place;
mod place_alias;

pub use place::{
    Entity as PlaceEntity,
    Model as Place,
    ActiveModel as PlaceActiveModel,
    Column as PlaceColumn,
    EntityClass,
};

pub use place_alias::{
    Entity as PlaceAliasEntity,
    Model as PlaceAlias,
    ActiveModel as PlaceAliasActiveModel,
    Column as PlaceAliasColumn,
};
