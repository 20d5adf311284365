use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::dto::{
    NewAdministrator, NewStudent, NewTeacher, StudentFilter, StudentUpdate, TeacherFilter,
    TeacherUpdate,
};
use super::repo;
use super::repo_types::{Administrator, Student, Teacher};
use crate::{
    auth::extractors::{AdminOnly, RequireRole, Staff},
    state::AppState,
};

type HandlerError = (StatusCode, String);

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
}

pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/teachers", get(list_teachers).post(create_teacher))
        .route(
            "/teachers/:id",
            get(get_teacher).put(update_teacher).delete(delete_teacher),
        )
}

pub fn administrator_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/administrators",
            get(list_administrators).post(create_administrator),
        )
        .route(
            "/administrators/:id",
            axum::routing::delete(delete_administrator),
        )
}

// --- students ---

#[instrument(skip(state, _caller))]
pub async fn list_students(
    RequireRole(_caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Query(filter): Query<StudentFilter>,
) -> Result<Json<Vec<Student>>, HandlerError> {
    let rows = repo::list_students(&state.db, filter.class_name.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[instrument(skip(state, _caller))]
pub async fn get_student(
    RequireRole(_caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Student>, HandlerError> {
    repo::get_student(&state.db, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found("Student"))
}

#[instrument(skip(state, caller, body))]
pub async fn create_student(
    RequireRole(caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Json(body): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), HandlerError> {
    if let Some(field) = body.missing_field() {
        return Err(missing(field));
    }
    let student = repo::create_student(&state.db, &body)
        .await
        .map_err(internal)?;
    info!(student_id = %student.id, by = %caller.id, "student created");
    Ok((StatusCode::CREATED, Json(student)))
}

#[instrument(skip(state, caller, body))]
pub async fn update_student(
    RequireRole(caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StudentUpdate>,
) -> Result<Json<Student>, HandlerError> {
    if let Some(field) = body.blank_field() {
        return Err(missing(field));
    }
    let student = repo::update_student(&state.db, id, &body)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Student"))?;
    info!(student_id = %id, by = %caller.id, "student updated");
    Ok(Json(student))
}

#[instrument(skip(state, caller))]
pub async fn delete_student(
    RequireRole(caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    if !repo::delete_student(&state.db, id).await.map_err(internal)? {
        return Err(not_found("Student"));
    }
    info!(student_id = %id, by = %caller.id, "student deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- teachers ---

#[instrument(skip(state, _caller))]
pub async fn list_teachers(
    RequireRole(_caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Query(filter): Query<TeacherFilter>,
) -> Result<Json<Vec<Teacher>>, HandlerError> {
    let rows = repo::list_teachers(&state.db, filter.subject.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[instrument(skip(state, _caller))]
pub async fn get_teacher(
    RequireRole(_caller, _): RequireRole<Staff>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Teacher>, HandlerError> {
    repo::get_teacher(&state.db, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found("Teacher"))
}

#[instrument(skip(state, caller, body))]
pub async fn create_teacher(
    RequireRole(caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
    Json(body): Json<NewTeacher>,
) -> Result<(StatusCode, Json<Teacher>), HandlerError> {
    if let Some(field) = body.missing_field() {
        return Err(missing(field));
    }
    let teacher = repo::create_teacher(&state.db, &body)
        .await
        .map_err(internal)?;
    info!(teacher_id = %teacher.id, by = %caller.id, "teacher created");
    Ok((StatusCode::CREATED, Json(teacher)))
}

#[instrument(skip(state, caller, body))]
pub async fn update_teacher(
    RequireRole(caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TeacherUpdate>,
) -> Result<Json<Teacher>, HandlerError> {
    if let Some(field) = body.blank_field() {
        return Err(missing(field));
    }
    let teacher = repo::update_teacher(&state.db, id, &body)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Teacher"))?;
    info!(teacher_id = %id, by = %caller.id, "teacher updated");
    Ok(Json(teacher))
}

#[instrument(skip(state, caller))]
pub async fn delete_teacher(
    RequireRole(caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    if !repo::delete_teacher(&state.db, id).await.map_err(internal)? {
        return Err(not_found("Teacher"));
    }
    info!(teacher_id = %id, by = %caller.id, "teacher deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- administrators ---

#[instrument(skip(state, _caller))]
pub async fn list_administrators(
    RequireRole(_caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Administrator>>, HandlerError> {
    let rows = repo::list_administrators(&state.db)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[instrument(skip(state, caller, body))]
pub async fn create_administrator(
    RequireRole(caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
    Json(body): Json<NewAdministrator>,
) -> Result<(StatusCode, Json<Administrator>), HandlerError> {
    if let Some(field) = body.missing_field() {
        return Err(missing(field));
    }
    let admin = repo::create_administrator(&state.db, &body)
        .await
        .map_err(internal)?;
    info!(administrator_id = %admin.id, by = %caller.id, "administrator created");
    Ok((StatusCode::CREATED, Json(admin)))
}

#[instrument(skip(state, caller))]
pub async fn delete_administrator(
    RequireRole(caller, _): RequireRole<AdminOnly>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    if !repo::delete_administrator(&state.db, id)
        .await
        .map_err(internal)?
    {
        return Err(not_found("Administrator"));
    }
    info!(administrator_id = %id, by = %caller.id, "administrator deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn internal(e: anyhow::Error) -> HandlerError {
    error!(error = %e, "records query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".into(),
    )
}

fn not_found(kind: &str) -> HandlerError {
    (StatusCode::NOT_FOUND, format!("{kind} not found"))
}

fn missing(field: &str) -> HandlerError {
    (StatusCode::BAD_REQUEST, format!("{field} is required"))
}
