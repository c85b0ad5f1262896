use chrono::NaiveDateTime;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

use crate::models::lesson_progress;

pub struct ProgressService;

/// Fusionne une mise à jour du minuteur avec l'état stocké.
///
/// - `time_spent_seconds` : max monotone — le client envoie un cumul, une
///   requête dupliquée ou arrivée en retard ne doit jamais faire reculer
///   le compteur.
/// - `completed_at` : posé à la PREMIÈRE complétion, conservé ensuite,
///   remis à NULL uniquement quand la leçon repasse en non-complétée.
pub fn merge_progress(
    existing: Option<&lesson_progress::Model>,
    time_spent_seconds: i32,
    is_completed: bool,
    now: NaiveDateTime,
) -> (i32, Option<NaiveDateTime>) {
    let stored_time = existing.map(|p| p.time_spent_seconds).unwrap_or(0);
    let time = stored_time.max(time_spent_seconds);

    let completed_at = if is_completed {
        existing.and_then(|p| p.completed_at).or(Some(now))
    } else {
        None
    };

    (time, completed_at)
}

impl ProgressService {
    /// Enregistre la progression d'un élève sur une leçon : insertion au
    /// premier passage, mise à jour ensuite. Lecture-puis-écriture simple,
    /// acceptable avec un seul écrivain par élève (son propre minuteur).
    pub async fn record(
        db: &DatabaseConnection,
        student_id: i32,
        lesson_id: i32,
        time_spent_seconds: i32,
        is_completed: bool,
    ) -> Result<(), DbErr> {
        let existing = lesson_progress::Entity::find_by_id((student_id, lesson_id))
            .one(db)
            .await?;

        let now = chrono::Utc::now().naive_utc();
        let (time, completed_at) =
            merge_progress(existing.as_ref(), time_spent_seconds, is_completed, now);

        match existing {
            None => {
                lesson_progress::Entity::insert(lesson_progress::ActiveModel {
                    student_id: Set(student_id),
                    lesson_id: Set(lesson_id),
                    time_spent_seconds: Set(time),
                    is_completed: Set(is_completed),
                    completed_at: Set(completed_at),
                })
                .exec(db)
                .await?;
            }
            Some(_) => {
                lesson_progress::Entity::update_many()
                    .col_expr(lesson_progress::Column::TimeSpentSeconds, Expr::value(time))
                    .col_expr(
                        lesson_progress::Column::IsCompleted,
                        Expr::value(is_completed),
                    )
                    .col_expr(
                        lesson_progress::Column::CompletedAt,
                        Expr::value(completed_at),
                    )
                    .filter(lesson_progress::Column::StudentId.eq(student_id))
                    .filter(lesson_progress::Column::LessonId.eq(lesson_id))
                    .exec(db)
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn stored(time: i32, completed: bool, completed_at: Option<NaiveDateTime>) -> lesson_progress::Model {
        lesson_progress::Model {
            student_id: 7,
            lesson_id: 3,
            time_spent_seconds: time,
            is_completed: completed,
            completed_at,
        }
    }

    #[test]
    fn test_first_completion_stamps_now() {
        let now = Utc::now().naive_utc();
        let (time, completed_at) = merge_progress(None, 120, true, now);

        assert_eq!(time, 120);
        assert_eq!(completed_at, Some(now));
    }

    #[test]
    fn test_repeated_completion_keeps_original_timestamp() {
        let first = Utc::now().naive_utc() - Duration::hours(2);
        let now = Utc::now().naive_utc();
        let existing = stored(300, true, Some(first));

        let (_, completed_at) = merge_progress(Some(&existing), 400, true, now);
        assert_eq!(completed_at, Some(first));
    }

    #[test]
    fn test_uncompleting_clears_timestamp() {
        let first = Utc::now().naive_utc() - Duration::hours(2);
        let existing = stored(300, true, Some(first));

        let (_, completed_at) =
            merge_progress(Some(&existing), 300, false, Utc::now().naive_utc());
        assert_eq!(completed_at, None);
    }

    #[test]
    fn test_recompletion_after_reset_gets_fresh_timestamp() {
        let now = Utc::now().naive_utc();
        let existing = stored(300, false, None);

        let (_, completed_at) = merge_progress(Some(&existing), 350, true, now);
        assert_eq!(completed_at, Some(now));
    }

    #[test]
    fn test_time_never_regresses() {
        let existing = stored(500, false, None);

        // Requête en retard avec un cumul plus petit : on garde 500
        let (time, _) = merge_progress(Some(&existing), 200, false, Utc::now().naive_utc());
        assert_eq!(time, 500);

        let (time, _) = merge_progress(Some(&existing), 720, false, Utc::now().naive_utc());
        assert_eq!(time, 720);
    }

    #[tokio::test]
    async fn test_record_inserts_on_first_write() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([Vec::<lesson_progress::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        ProgressService::record(&db, 7, 3, 60, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_updates_existing_row() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![stored(60, false, None)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        ProgressService::record(&db, 7, 3, 120, true).await.unwrap();
    }
}
