use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub course_id: i32,
    pub teacher_id: i32,
    // NULL = cours privé, hors placówka
    pub workplace_id: Option<i32>,
    pub title: String,
    pub description: Option<String>,
    pub course_type: CourseType,
    pub created_at: DateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    #[sea_orm(string_value = "individual")]
    Individual,
    #[sea_orm(string_value = "group")]
    Group,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::UserId"
    )]
    Teacher,

    #[sea_orm(
        belongs_to = "super::workplace::Entity",
        from = "Column::WorkplaceId",
        to = "super::workplace::Column::WorkplaceId"
    )]
    Workplace,

    #[sea_orm(has_many = "super::lesson::Entity")]
    Lesson,

    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollment,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::workplace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workplace.def()
    }
}

impl Related<super::lesson::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lesson.def()
    }
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
