use archrender_types::{Coupon, CouponSpec, ParseEnumError, coupons::normalize_code, now_millis};
use diesel::prelude::*;
use tracing::debug;

use crate::db::{DbResult, PooledConnection, schema::*};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = coupons)]
pub struct CouponModel {
    pub id: i32,
    pub code: String,
    pub discount_type: String,
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl TryFrom<CouponModel> for Coupon {
    type Error = ParseEnumError;

    fn try_from(model: CouponModel) -> Result<Self, Self::Error> {
        Ok(Coupon {
            id: model.id,
            code: model.code,
            discount_type: model.discount_type.parse()?,
            discount_value: model.discount_value,
            max_uses: model.max_uses,
            used_count: model.used_count,
            expires_at: model.expires_at,
            is_active: model.is_active,
            created_at: model.created_at,
        })
    }
}

/// Columns a catalog file controls. `used_count` is deliberately absent so
/// re-seeding never resets redemptions.
#[derive(Insertable, AsChangeset)]
#[diesel(table_name = coupons, treat_none_as_null = true)]
pub struct CouponValues<'a> {
    pub code: &'a str,
    pub discount_type: &'a str,
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub expires_at: Option<i64>,
    pub is_active: bool,
}

pub fn find_by_code(conn: &mut PooledConnection, code: &str) -> DbResult<Option<Coupon>> {
    let model = coupons::table
        .filter(coupons::code.eq(normalize_code(code)))
        .select(CouponModel::as_select())
        .first(conn)
        .optional()?;
    Ok(model.map(Coupon::try_from).transpose()?)
}

pub fn upsert(conn: &mut PooledConnection, spec: &CouponSpec) -> QueryResult<i32> {
    let code = normalize_code(&spec.code);
    let values = CouponValues {
        code: &code,
        discount_type: spec.discount_type.as_str(),
        discount_value: spec.discount_value,
        max_uses: spec.max_uses,
        expires_at: spec.expires_at.map(|at| at.timestamp_millis()),
        is_active: spec.active,
    };

    let existing = coupons::table
        .filter(coupons::code.eq(&code))
        .select(coupons::id)
        .first::<i32>(conn)
        .optional()?;

    match existing {
        Some(id) => {
            debug!("Updating coupon {} ({})", code, id);
            diesel::update(coupons::table.find(id))
                .set(&values)
                .execute(conn)?;
            Ok(id)
        }
        None => {
            debug!("Inserting coupon {}", code);
            diesel::insert_into(coupons::table)
                .values((
                    &values,
                    coupons::used_count.eq(0),
                    coupons::created_at.eq(now_millis()),
                ))
                .returning(coupons::id)
                .get_result(conn)
        }
    }
}

/// Count one redemption. Runs inside the payment completion transaction.
pub fn increment_usage(conn: &mut PooledConnection, code: &str) -> QueryResult<bool> {
    let updated = diesel::update(coupons::table.filter(coupons::code.eq(normalize_code(code))))
        .set(coupons::used_count.eq(coupons::used_count + 1))
        .execute(conn)?;
    Ok(updated > 0)
}
