use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A named request resource. `name` is the external identifier; `id` only
/// orders rows by insertion.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub name: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    pub status: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
