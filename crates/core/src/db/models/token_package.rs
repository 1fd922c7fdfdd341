use archrender_types::{TokenPackage, TokenPackageSpec, now_millis};
use diesel::prelude::*;
use tracing::debug;

use crate::db::{PooledConnection, schema::*};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = token_packages)]
pub struct TokenPackageModel {
    pub id: i32,
    pub name: String,
    pub token_amount: i64,
    pub price_in_cents: i64,
    pub price_per_token: i64,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: i64,
}

impl From<TokenPackageModel> for TokenPackage {
    fn from(model: TokenPackageModel) -> Self {
        TokenPackage {
            id: model.id,
            name: model.name,
            token_amount: model.token_amount,
            price_in_cents: model.price_in_cents,
            price_per_token: model.price_per_token,
            is_active: model.is_active,
            display_order: model.display_order,
            created_at: model.created_at,
        }
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = token_packages)]
pub struct NewTokenPackage<'a> {
    pub name: &'a str,
    pub token_amount: i64,
    pub price_in_cents: i64,
    pub price_per_token: i64,
    pub is_active: bool,
    pub display_order: i32,
}

impl<'a> From<&'a TokenPackageSpec> for NewTokenPackage<'a> {
    fn from(spec: &'a TokenPackageSpec) -> Self {
        Self {
            name: &spec.name,
            token_amount: spec.token_amount,
            price_in_cents: spec.price_in_cents,
            price_per_token: spec.resolved_price_per_token(),
            is_active: spec.active,
            display_order: spec.display_order,
        }
    }
}

pub fn list_active(conn: &mut PooledConnection) -> QueryResult<Vec<TokenPackage>> {
    let models = token_packages::table
        .filter(token_packages::is_active.eq(true))
        .order((token_packages::display_order.asc(), token_packages::id.asc()))
        .select(TokenPackageModel::as_select())
        .load(conn)?;
    Ok(models.into_iter().map(TokenPackage::from).collect())
}

pub fn find(conn: &mut PooledConnection, package_id: i32) -> QueryResult<Option<TokenPackage>> {
    let model = token_packages::table
        .find(package_id)
        .select(TokenPackageModel::as_select())
        .first(conn)
        .optional()?;
    Ok(model.map(TokenPackage::from))
}

/// Insert a package, or update the one with the same name.
pub fn upsert(conn: &mut PooledConnection, spec: &TokenPackageSpec) -> QueryResult<i32> {
    let values = NewTokenPackage::from(spec);
    let existing = token_packages::table
        .filter(token_packages::name.eq(&spec.name))
        .select(token_packages::id)
        .first::<i32>(conn)
        .optional()?;

    match existing {
        Some(id) => {
            debug!("Updating token package '{}' ({})", spec.name, id);
            diesel::update(token_packages::table.find(id))
                .set(&values)
                .execute(conn)?;
            Ok(id)
        }
        None => {
            debug!("Inserting token package '{}'", spec.name);
            diesel::insert_into(token_packages::table)
                .values((&values, token_packages::created_at.eq(now_millis())))
                .returning(token_packages::id)
                .get_result(conn)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;

    use super::*;

    fn spec(name: &str, tokens: i64, price: i64, order: i32) -> TokenPackageSpec {
        TokenPackageSpec {
            name: name.to_string(),
            token_amount: tokens,
            price_in_cents: price,
            price_per_token: None,
            display_order: order,
            active: true,
        }
    }

    #[test]
    fn test_active_packages_in_display_order() {
        let (_dir, db) = temp_db();
        db.upsert_package(&spec("Popular", 25, 20000, 3)).unwrap();
        db.upsert_package(&spec("Starter", 5, 5000, 1)).unwrap();
        let mut retired = spec("Legacy", 1, 1500, 0);
        retired.active = false;
        db.upsert_package(&retired).unwrap();

        let packages = db.list_active_packages().unwrap();
        let names = packages.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Starter", "Popular"]);
        assert_eq!(packages[1].price_per_token, 800);
    }

    #[test]
    fn test_upsert_by_name_keeps_id() {
        let (_dir, db) = temp_db();
        let id = db.upsert_package(&spec("Basic", 10, 9000, 2)).unwrap();
        let again = db.upsert_package(&spec("Basic", 12, 9000, 2)).unwrap();
        assert_eq!(id, again);

        let package = db.find_package(id).unwrap().unwrap();
        assert_eq!(package.token_amount, 12);
        assert_eq!(package.price_per_token, 750);
        assert!(db.find_package(id + 100).unwrap().is_none());
    }
}
