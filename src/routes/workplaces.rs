use actix_web::{HttpResponse, delete, get, post, put, web};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::{AuthUser, TeacherUser};
use crate::models::workplace::{self, PaymentType};

#[derive(Deserialize)]
pub struct WorkplaceRequest {
    pub name: Option<String>,
    pub color_hex: Option<String>,
    pub payment_type: Option<PaymentType>,
    pub payment_amount: Option<Decimal>,
    pub sort_order: Option<i32>,
}

#[derive(Deserialize)]
pub struct ReorderItem {
    pub workplace_id: i32,
    pub sort_order: i32,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

/// GET /workplaces - toutes les placówki du compte connecté, dans l'ordre
/// choisi par l'utilisateur (PROTÉGÉE)
#[get("")]
pub async fn list_workplaces(
    auth: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let workplaces = workplace::Entity::find()
        .filter(workplace::Column::TeacherId.eq(auth.user.user_id))
        .order_by_asc(workplace::Column::SortOrder)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": workplaces })))
}

/// POST /workplaces - création (PROF)
#[post("")]
pub async fn create_workplace(
    teacher: TeacherUser,
    body: web::Json<WorkplaceRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Workplace name is required.".to_string()))?;

    let payment_type = body.payment_type.unwrap_or(PaymentType::None);
    // Pas de mode de paiement => le montant n'a pas de sens, on l'écarte
    let payment_amount = match payment_type {
        PaymentType::None => None,
        _ => body.payment_amount,
    };

    let inserted = workplace::Entity::insert(workplace::ActiveModel {
        teacher_id: Set(teacher.0.user.user_id),
        name: Set(name.to_string()),
        color_hex: Set(body
            .color_hex
            .clone()
            .unwrap_or_else(|| "#6366F1".to_string())),
        payment_type: Set(payment_type),
        payment_amount: Set(payment_amount),
        sort_order: Set(body.sort_order.unwrap_or(0)),
        ..Default::default()
    })
    .exec(db.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "workplace_id": inserted.last_insert_id,
    })))
}

/// PUT /workplaces/reorder/all - réordonnancement en masse après un
/// glisser-déposer (PROF). Transactionnel : l'ordre est appliqué en entier
/// ou pas du tout. Chaque UPDATE reste borné par teacher_id, un id qui ne
/// m'appartient pas est simplement sans effet.
#[put("/reorder/all")]
pub async fn reorder_workplaces(
    teacher: TeacherUser,
    body: web::Json<ReorderRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let txn = db.get_ref().begin().await?;

    for item in &body.items {
        workplace::Entity::update_many()
            .col_expr(workplace::Column::SortOrder, Expr::value(item.sort_order))
            .filter(workplace::Column::WorkplaceId.eq(item.workplace_id))
            .filter(workplace::Column::TeacherId.eq(teacher.0.user.user_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /workplaces/{id} - détail, borné au propriétaire (PROTÉGÉE)
#[get("/{id}")]
pub async fn get_workplace(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let workplace_id = path.into_inner();

    let workplace = workplace::Entity::find_by_id(workplace_id)
        .filter(workplace::Column::TeacherId.eq(auth.user.user_id))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Workplace not found.".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": workplace })))
}

/// PUT /workplaces/{id} - mise à jour (PROF). UPDATE borné par teacher_id :
/// zéro ligne touchée = inexistant OU pas à moi, même 404 dans les deux cas.
#[put("/{id}")]
pub async fn update_workplace(
    teacher: TeacherUser,
    path: web::Path<i32>,
    body: web::Json<WorkplaceRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let workplace_id = path.into_inner();

    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Workplace name is required.".to_string()))?;

    let payment_type = body.payment_type.unwrap_or(PaymentType::None);
    let payment_amount = match payment_type {
        PaymentType::None => None,
        _ => body.payment_amount,
    };

    let result = workplace::Entity::update_many()
        .col_expr(workplace::Column::Name, Expr::value(name))
        .col_expr(
            workplace::Column::ColorHex,
            Expr::value(
                body.color_hex
                    .clone()
                    .unwrap_or_else(|| "#6366F1".to_string()),
            ),
        )
        .col_expr(workplace::Column::PaymentType, Expr::value(payment_type))
        .col_expr(
            workplace::Column::PaymentAmount,
            Expr::value(payment_amount),
        )
        .filter(workplace::Column::WorkplaceId.eq(workplace_id))
        .filter(workplace::Column::TeacherId.eq(teacher.0.user.user_id))
        .exec(db.get_ref())
        .await?;

    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Workplace not found.".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// DELETE /workplaces/{id} - suppression, même politique 404 (PROF)
#[delete("/{id}")]
pub async fn delete_workplace(
    teacher: TeacherUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let workplace_id = path.into_inner();

    let result = workplace::Entity::delete_many()
        .filter(workplace::Column::WorkplaceId.eq(workplace_id))
        .filter(workplace::Column::TeacherId.eq(teacher.0.user.user_id))
        .exec(db.get_ref())
        .await?;

    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Workplace not found.".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

pub fn workplace_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/workplaces")
            .service(list_workplaces)
            .service(create_workplace)
            .service(reorder_workplaces)
            .service(get_workplace)
            .service(update_workplace)
            .service(delete_workplace),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test, web::Data};
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use crate::models::user::{self, Role};
    use crate::utils::jwt;

    fn teacher_model() -> user::Model {
        user::Model {
            user_id: 1,
            email: "prof@test.pl".to_string(),
            password_hash: "pbkdf2:sha256:600000$x$y".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Nowak".to_string(),
            role: Role::Teacher,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn teacher_session(db: MockDatabase) -> MockDatabase {
        db.append_query_results([vec![crate::models::user_token::Model {
            token_id: "live-token".to_string(),
            user_id: 1,
        }]])
        .append_query_results([vec![teacher_model()]])
    }

    #[actix_web::test]
    async fn test_list_uses_success_envelope() {
        let db = teacher_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_query_results([Vec::<workplace::Model>::new()])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .configure(workplace_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/workplaces")
            .cookie(jwt::session_cookie(signed))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 200);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], serde_json::json!(true));
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[actix_web::test]
    async fn test_reorder_accepts_items_payload() {
        let db = teacher_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .configure(workplace_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/workplaces/reorder/all")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({
                "items": [{ "workplace_id": 3, "sort_order": 1 }]
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 200);
    }

    #[actix_web::test]
    async fn test_create_without_name_is_400() {
        let db = teacher_session(MockDatabase::new(DatabaseBackend::MySql)).into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .configure(workplace_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/workplaces")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({ "name": "   " }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400);
    }

    #[actix_web::test]
    async fn test_update_foreign_workplace_is_404() {
        // L'UPDATE borné par teacher_id ne touche aucune ligne
        let db = teacher_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .configure(workplace_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/workplaces/99")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({ "name": "Szkoła Muzyczna" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 404);
    }
}
