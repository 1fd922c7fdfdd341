use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use archrender_core::db::DbManager;
use archrender_types::{CouponSpec, TokenPackageSpec};
use console::style;
use serde::{Deserialize, Serialize};

/// Catalog file contents
///
/// ```yaml
/// packages:
///   - name: Starter
///     token_amount: 5
///     price_in_cents: 5000
/// coupons:
///   - code: WELCOME10
///     discount_type: percentage
///     discount_value: 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub packages: Vec<TokenPackageSpec>,
    #[serde(default)]
    pub coupons: Vec<CouponSpec>,
}

impl Catalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        serde_yml::from_str(&content)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))
    }

    /// Upsert every package (by name) and coupon (by code).
    pub fn apply(&self, db: &DbManager) -> anyhow::Result<()> {
        for package in &self.packages {
            db.upsert_package(package)
                .with_context(|| format!("Failed to seed package {}", package.name))?;
        }
        for coupon in &self.coupons {
            db.upsert_coupon(coupon)
                .with_context(|| format!("Failed to seed coupon {}", coupon.code))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct SeedCommand {
    /// Catalog YAML file
    #[arg(long, default_value = "billing/catalog.yaml")]
    pub catalog: PathBuf,

    #[arg(long, env = "DATABASE_URL", default_value = "archrender.sqlite")]
    pub database_url: String,
}

impl SeedCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let catalog = Catalog::load(&self.catalog)?;
        println!(
            "{} {}",
            style("Loaded catalog").dim(),
            self.catalog.display()
        );

        let db = DbManager::new(&self.database_url).context("Failed to open database")?;
        catalog.apply(&db)?;

        println!(
            "{}",
            style(format!(
                "✓ {} packages, {} coupons",
                catalog.packages.len(),
                catalog.coupons.len()
            ))
            .green()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use archrender_types::DiscountType;

    use super::*;

    fn shipped_catalog() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../billing/catalog.yaml")
    }

    #[test]
    fn test_shipped_catalog_parses() {
        let catalog = Catalog::load(&shipped_catalog()).unwrap();
        let names: Vec<_> = catalog.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Starter", "Basic", "Popular", "Professional", "Premium"]
        );
        assert_eq!(catalog.packages[1].token_amount, 10);
        assert_eq!(catalog.packages[1].price_in_cents, 9000);

        let welcome = &catalog.coupons[0];
        assert_eq!(welcome.code, "WELCOME10");
        assert_eq!(welcome.discount_type, DiscountType::Percentage);
        assert_eq!(welcome.max_uses, None);
        assert!(catalog.coupons[1].expires_at.is_some());
    }

    #[test]
    fn test_seeding_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("seed.sqlite");
        let command = SeedCommand {
            catalog: shipped_catalog(),
            database_url: db_path.to_str().unwrap().to_string(),
        };
        command.execute().unwrap();
        command.execute().unwrap();

        let db = DbManager::new(db_path.to_str().unwrap()).unwrap();
        let packages = db.list_active_packages().unwrap();
        assert_eq!(packages.len(), 5);
        assert_eq!(packages[0].name, "Starter");
        assert!(db.find_coupon("discount50").unwrap().is_some());
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        fs::write(&path, "packages:\n  - name: Solo\n    token_amount: 1\n    price_in_cents: 1200\n")
            .unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.packages.len(), 1);
        assert!(catalog.coupons.is_empty());
        assert_eq!(catalog.packages[0].resolved_price_per_token(), 1200);
    }
}
