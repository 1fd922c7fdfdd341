use archrender_types::{Account, ParseEnumError, Role, now_millis};
use diesel::prelude::*;
use tracing::debug;

use crate::db::{DbError, DbResult, PooledConnection, schema::*};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = accounts)]
pub struct AccountModel {
    pub id: i32,
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
    pub token_balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_signed_in: i64,
}

impl TryFrom<AccountModel> for Account {
    type Error = ParseEnumError;

    fn try_from(model: AccountModel) -> Result<Self, Self::Error> {
        Ok(Account {
            id: model.id,
            external_id: model.external_id,
            email: model.email,
            name: model.name,
            role: model.role.parse()?,
            token_balance: model.token_balance,
            created_at: model.created_at,
            updated_at: model.updated_at,
            last_signed_in: model.last_signed_in,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub external_id: &'a str,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub role: &'a str,
    pub token_balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_signed_in: i64,
}

impl<'a> NewAccount<'a> {
    pub fn new(
        external_id: &'a str,
        email: Option<&'a str>,
        name: Option<&'a str>,
        role: Role,
        initial_tokens: i64,
    ) -> Self {
        let timestamp = now_millis();
        Self {
            external_id,
            email,
            name,
            role: role.as_str(),
            token_balance: initial_tokens.max(0),
            created_at: timestamp,
            updated_at: timestamp,
            last_signed_in: timestamp,
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<AccountModel> {
        debug!(
            "Inserting account {} with {} tokens",
            self.external_id, self.token_balance
        );
        diesel::insert_into(accounts::table)
            .values(self)
            .returning(AccountModel::as_returning())
            .get_result(conn)
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = accounts)]
struct AccountSignIn<'a> {
    email: Option<&'a str>,
    name: Option<&'a str>,
    role: Option<&'a str>,
    updated_at: i64,
    last_signed_in: i64,
}

fn find_by_external_id(
    conn: &mut PooledConnection,
    external_id: &str,
) -> QueryResult<Option<AccountModel>> {
    accounts::table
        .filter(accounts::external_id.eq(external_id))
        .select(AccountModel::as_select())
        .first(conn)
        .optional()
}

pub fn ensure(
    conn: &mut PooledConnection,
    external_id: &str,
    email: Option<&str>,
    name: Option<&str>,
    initial_tokens: i64,
    role: Role,
) -> DbResult<Account> {
    let existing = match find_by_external_id(conn, external_id)? {
        Some(model) => model,
        None => {
            let new_account = NewAccount::new(external_id, email, name, role, initial_tokens);
            match new_account.insert(conn) {
                Ok(model) => return Ok(model.try_into()?),
                // Another request created it first
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) => find_by_external_id(conn, external_id)?
                    .ok_or_else(|| DbError::ConnectionError("account vanished".to_string()))?,
                Err(e) => return Err(e.into()),
            }
        }
    };

    let timestamp = now_millis();
    // Roles are only ever raised here; demotion goes through set_role.
    let promote = matches!(role, Role::Admin) && existing.role != Role::Admin.as_str();
    let changes = AccountSignIn {
        email,
        name,
        role: promote.then(|| Role::Admin.as_str()),
        updated_at: timestamp,
        last_signed_in: timestamp,
    };
    let model = diesel::update(accounts::table.find(existing.id))
        .set(&changes)
        .returning(AccountModel::as_returning())
        .get_result(conn)?;
    Ok(model.try_into()?)
}

pub fn find(conn: &mut PooledConnection, account_id: i32) -> DbResult<Option<Account>> {
    let model = accounts::table
        .find(account_id)
        .select(AccountModel::as_select())
        .first(conn)
        .optional()?;
    Ok(model.map(Account::try_from).transpose()?)
}

pub fn set_role(conn: &mut PooledConnection, account_id: i32, role: Role) -> DbResult<()> {
    let updated = diesel::update(accounts::table.find(account_id))
        .set((
            accounts::role.eq(role.as_str()),
            accounts::updated_at.eq(now_millis()),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(DbError::AccountNotFound(account_id));
    }
    Ok(())
}

pub fn list(conn: &mut PooledConnection) -> DbResult<Vec<Account>> {
    let models = accounts::table
        .order(accounts::id.asc())
        .select(AccountModel::as_select())
        .load(conn)?;
    Ok(models
        .into_iter()
        .map(Account::try_from)
        .collect::<Result<_, _>>()?)
}
