use archrender_types::{Account, Role};
use axum::{Extension, Json, extract::Path};
use serde::{Deserialize, Serialize};

use super::{AppState, CurrentAccount, ListResponse};
use crate::{
    db::{AccountSummary, ServiceStats},
    error::ServiceResult,
};

#[derive(Debug, Deserialize)]
pub struct GrantBonusRequest {
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GrantBonusResponse {
    pub account_id: i32,
    pub token_balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// GET /api/me
pub async fn me(CurrentAccount(account): CurrentAccount) -> Json<Account> {
    Json(account)
}

/// GET /api/admin/stats
pub async fn stats(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ServiceResult<Json<ServiceStats>> {
    Ok(Json(state.admin.stats(&account)?))
}

/// GET /api/admin/accounts
pub async fn list_accounts(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ServiceResult<Json<ListResponse<AccountSummary>>> {
    let summaries = state.admin.account_summaries(&account)?;
    Ok(Json(ListResponse::new("/api/admin/accounts", summaries)))
}

/// POST /api/admin/accounts/{id}/bonus
pub async fn grant_bonus(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(account_id): Path<i32>,
    Json(request): Json<GrantBonusRequest>,
) -> ServiceResult<Json<GrantBonusResponse>> {
    let token_balance = state.admin.grant_bonus(
        &account,
        account_id,
        request.amount,
        request.description.as_deref(),
    )?;
    Ok(Json(GrantBonusResponse {
        account_id,
        token_balance,
    }))
}

/// POST /api/admin/accounts/{id}/role
pub async fn set_role(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(account_id): Path<i32>,
    Json(request): Json<SetRoleRequest>,
) -> ServiceResult<Json<Account>> {
    Ok(Json(state.admin.set_role(&account, account_id, request.role)?))
}
