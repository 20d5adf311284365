use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{NewAdministrator, NewStudent, NewTeacher, StudentUpdate, TeacherUpdate};
use super::repo_types::{Administrator, Student, Teacher};

pub async fn list_students(
    db: &PgPool,
    class_name: Option<&str>,
) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, email, phone, class_name, grades, created_at
        FROM students
        WHERE $1::text IS NULL OR class_name = $1
        ORDER BY name
        "#,
    )
    .bind(class_name)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_student(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, email, phone, class_name, grades, created_at
        FROM students
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn create_student(db: &PgPool, new: &NewStudent) -> anyhow::Result<Student> {
    let row = sqlx::query_as::<_, Student>(
        r#"
        INSERT INTO students (name, email, phone, class_name, grades)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, email, phone, class_name, grades, created_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.class_name)
    .bind(&new.grades)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update_student(
    db: &PgPool,
    id: Uuid,
    update: &StudentUpdate,
) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query_as::<_, Student>(
        r#"
        UPDATE students SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            class_name = COALESCE($5, class_name),
            grades = COALESCE($6, grades)
        WHERE id = $1
        RETURNING id, name, email, phone, class_name, grades, created_at
        "#,
    )
    .bind(id)
    .bind(&update.name)
    .bind(&update.email)
    .bind(&update.phone)
    .bind(&update.class_name)
    .bind(&update.grades)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn delete_student(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_teachers(db: &PgPool, subject: Option<&str>) -> anyhow::Result<Vec<Teacher>> {
    let rows = sqlx::query_as::<_, Teacher>(
        r#"
        SELECT id, name, email, subject, phone, created_at
        FROM teachers
        WHERE $1::text IS NULL OR subject = $1
        ORDER BY name
        "#,
    )
    .bind(subject)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_teacher(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Teacher>> {
    let row = sqlx::query_as::<_, Teacher>(
        r#"
        SELECT id, name, email, subject, phone, created_at
        FROM teachers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn create_teacher(db: &PgPool, new: &NewTeacher) -> anyhow::Result<Teacher> {
    let row = sqlx::query_as::<_, Teacher>(
        r#"
        INSERT INTO teachers (name, email, subject, phone)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, subject, phone, created_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.subject)
    .bind(&new.phone)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update_teacher(
    db: &PgPool,
    id: Uuid,
    update: &TeacherUpdate,
) -> anyhow::Result<Option<Teacher>> {
    let row = sqlx::query_as::<_, Teacher>(
        r#"
        UPDATE teachers SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            subject = COALESCE($4, subject),
            phone = COALESCE($5, phone)
        WHERE id = $1
        RETURNING id, name, email, subject, phone, created_at
        "#,
    )
    .bind(id)
    .bind(&update.name)
    .bind(&update.email)
    .bind(&update.subject)
    .bind(&update.phone)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn delete_teacher(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM teachers WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_administrators(db: &PgPool) -> anyhow::Result<Vec<Administrator>> {
    let rows = sqlx::query_as::<_, Administrator>(
        r#"SELECT id, name, email, created_at FROM administrators ORDER BY name"#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn create_administrator(
    db: &PgPool,
    new: &NewAdministrator,
) -> anyhow::Result<Administrator> {
    let row = sqlx::query_as::<_, Administrator>(
        r#"
        INSERT INTO administrators (name, email)
        VALUES ($1, $2)
        RETURNING id, name, email, created_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn delete_administrator(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM administrators WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
