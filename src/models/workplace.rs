use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workplaces")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub workplace_id: i32,
    pub teacher_id: i32,
    pub name: String,
    pub color_hex: String,
    pub payment_type: PaymentType,
    // Montant pertinent seulement quand payment_type != none
    pub payment_amount: Option<Decimal>,
    pub sort_order: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "per_lesson")]
    PerLesson,
    #[sea_orm(string_value = "monthly")]
    Monthly,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::UserId"
    )]
    Teacher,

    #[sea_orm(has_many = "super::course::Entity")]
    Course,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
