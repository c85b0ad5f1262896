use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashSet;

use crate::models::course::{self, CourseType};
use crate::models::enrollment;
use crate::models::user::{self, Role};

pub struct CourseService;

pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub workplace_id: Option<i32>,
    pub course_type: CourseType,
    pub student_emails: Vec<String>,
}

impl CourseService {
    /// Crée le cours et inscrit la liste initiale d'élèves dans UNE SEULE
    /// transaction : jamais de cours sans ses inscriptions, jamais
    /// d'inscriptions sans cours, rien ne survit à un échec partiel.
    ///
    /// Les emails sont nettoyés (trim, vides écartés) puis résolus en un
    /// seul lot `role = student AND email IN (...)`. Un email sans compte
    /// élève est ignoré silencieusement — le contrat historique de l'API.
    pub async fn create(
        db: &DatabaseConnection,
        teacher_id: i32,
        input: NewCourse,
    ) -> Result<i32, DbErr> {
        let txn = db.begin().await?;

        let inserted = course::Entity::insert(course::ActiveModel {
            teacher_id: Set(teacher_id),
            workplace_id: Set(input.workplace_id),
            title: Set(input.title),
            description: Set(input.description),
            course_type: Set(input.course_type),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        })
        .exec(&txn)
        .await?;

        let course_id = inserted.last_insert_id;

        let clean_emails: Vec<String> = input
            .student_emails
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if !clean_emails.is_empty() {
            let students = user::Entity::find()
                .filter(user::Column::Role.eq(Role::Student))
                .filter(user::Column::Email.is_in(clean_emails))
                .all(&txn)
                .await?;

            // Dédoublonnage en mémoire : à la création il n'existe encore
            // aucune ligne, la paire (student_id, course_id) reste unique.
            let mut seen = HashSet::new();
            let rows: Vec<enrollment::ActiveModel> = students
                .into_iter()
                .filter(|s| seen.insert(s.user_id))
                .map(|s| enrollment::ActiveModel {
                    student_id: Set(s.user_id),
                    course_id: Set(course_id),
                })
                .collect();

            if !rows.is_empty() {
                enrollment::Entity::insert_many(rows).exec(&txn).await?;
            }
        }

        txn.commit().await?;
        Ok(course_id)
    }

    /// Ajout direct d'un élève déjà résolu. Idempotent : réinscrire un
    /// élève déjà présent est un no-op.
    pub async fn enroll(
        db: &DatabaseConnection,
        course_id: i32,
        student_id: i32,
    ) -> Result<(), DbErr> {
        let existing = enrollment::Entity::find_by_id((student_id, course_id))
            .one(db)
            .await?;

        if existing.is_some() {
            return Ok(());
        }

        enrollment::Entity::insert(enrollment::ActiveModel {
            student_id: Set(student_id),
            course_id: Set(course_id),
        })
        .exec(db)
        .await?;

        Ok(())
    }
}
