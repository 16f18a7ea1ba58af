use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::category::Category;
use outlay_common::permissions::{self, Actor, ObjectView, Operation, Resource};
use outlay_common::request_io::{
    CategoryListQuery, InputCategory, InputEditCategory, MessageResponse, OutputCategory,
    OutputPage,
};
use outlay_common::validators;

use actix_web::web;
use actix_web::HttpResponse;
use std::str::FromStr;
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{clamp_page_params, resolve_actor};
use crate::middleware::auth::{Access, VerifiedToken};
use crate::middleware::FromBearerHeader;

const CATEGORY_NOT_FOUND_MSG: &str = "Category not found";

async fn get_permitted_category(
    db_async_pool: &DbAsyncPool,
    actor: &Actor,
    category_id: &str,
    operation: Operation,
) -> Result<Category, HttpErrorResponse> {
    let category_id = Uuid::from_str(category_id).map_err(|_| {
        HttpErrorResponse::IncorrectlyFormed(String::from("Invalid category_id format"))
    })?;

    let category_dao = db::category::Dao::new(db_async_pool);
    let category = category_dao
        .get_category_by_id(category_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from(CATEGORY_NOT_FOUND_MSG)))?;

    if !permissions::is_allowed(
        Resource::Category,
        actor,
        &ObjectView::from(&category),
        operation,
    ) {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            CATEGORY_NOT_FOUND_MSG,
        )));
    }

    Ok(category)
}

fn normalized_name(name: &str) -> Result<String, HttpErrorResponse> {
    if name.is_empty() || name.len() > 100 {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Category name length should be between 1 to 100",
        )));
    }

    let normalized = validators::normalize_category_name(name);

    if normalized.is_empty() {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Category name must include letters or digits",
        )));
    }

    Ok(normalized)
}

pub async fn list_categories(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    query: web::Query<CategoryListQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let (page, per_page) = clamp_page_params(query.page, query.per_page);

    let category_dao = db::category::Dao::new(&db_async_pool);

    let (categories, total) = if actor.is_staff {
        let filter_user = match query.user_id.as_deref() {
            Some(raw) => Some(Uuid::from_str(raw).map_err(|_| {
                HttpErrorResponse::IncorrectlyFormed(format!("Invalid user_id format: {raw}"))
            })?),
            None => None,
        };

        category_dao.list_all(filter_user, page, per_page).await?
    } else {
        // Any supplied user_id is ignored for regular users
        category_dao
            .list_visible_to(actor.id, page, per_page)
            .await?
    };

    let items = categories
        .iter()
        .map(OutputCategory::from)
        .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(OutputPage::new(items, total, page, per_page)))
}

pub async fn create_category(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    category_data: web::Json<InputCategory>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let owner = user_dao
        .get_user_by_id(category_data.user_id)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("User not found")))?;

    if !actor.is_staff {
        if owner.id != actor.id {
            return Err(HttpErrorResponse::InvalidState(String::from(
                "You can create categories for yourself only",
            )));
        }
    } else if owner.is_staff && owner.id != actor.id {
        // Staff may create categories for themselves or for regular users,
        // never for other staff
        return Err(HttpErrorResponse::InvalidState(String::from(
            "You cannot create a category on behalf of other staff users",
        )));
    }

    let name = normalized_name(&category_data.name)?;

    let category_dao = db::category::Dao::new(&db_async_pool);

    if category_dao
        .visible_name_exists(owner.id, &name, None)
        .await?
    {
        return Err(HttpErrorResponse::ConflictWithExisting(String::from(
            "A category with this name already exists",
        )));
    }

    // Categories owned by staff are the predefined set every user can see
    let category = category_dao
        .create_category(owner.id, &name, owner.is_staff)
        .await?;

    log::info!("Category {} created by user {}", category.id, actor.id);

    Ok(HttpResponse::Created().json(OutputCategory::from(&category)))
}

pub async fn get_category(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    category_id: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let category = get_permitted_category(
        &db_async_pool,
        &Actor::from(&actor),
        &category_id,
        Operation::Read,
    )
    .await?;

    Ok(HttpResponse::Ok().json(OutputCategory::from(&category)))
}

pub async fn edit_category(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    category_id: web::Path<String>,
    edits: web::Json<InputEditCategory>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let category = get_permitted_category(
        &db_async_pool,
        &Actor::from(&actor),
        &category_id,
        Operation::Write,
    )
    .await?;

    let name = normalized_name(&edits.name)?;

    // Renaming to the same normalized name is a no-op, not a conflict
    if name == category.name {
        return Ok(HttpResponse::Ok().json(OutputCategory::from(&category)));
    }

    let category_dao = db::category::Dao::new(&db_async_pool);

    if category_dao
        .visible_name_exists(category.user_id, &name, Some(category.id))
        .await?
    {
        return Err(HttpErrorResponse::ConflictWithExisting(String::from(
            "A category with this name already exists",
        )));
    }

    let updated = category_dao.rename_category(category.id, &name).await?;

    log::info!("Category {} renamed by user {}", updated.id, actor.id);

    Ok(HttpResponse::Ok().json(OutputCategory::from(&updated)))
}

pub async fn delete_category(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    category_id: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let category = get_permitted_category(
        &db_async_pool,
        &Actor::from(&actor),
        &category_id,
        Operation::Write,
    )
    .await?;

    let category_dao = db::category::Dao::new(&db_async_pool);

    if category_dao
        .has_non_deleted_transactions(category.id)
        .await?
    {
        return Err(HttpErrorResponse::InvalidState(String::from(
            "This category cannot be deleted as there are associated transactions",
        )));
    }

    category_dao.soft_delete_category(category.id).await?;

    log::info!("Category {} deleted by user {}", category.id, actor.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("Category deleted successfully")))
}
