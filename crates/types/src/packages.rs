use serde::{Deserialize, Serialize};

/// Catalog entry offered for purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPackage {
    pub id: i32,
    pub name: String,
    pub token_amount: i64,
    /// Price in minor currency units
    pub price_in_cents: i64,
    pub price_per_token: i64,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: i64,
}

/// Package definition as written in a catalog YAML file
///
/// ```yaml
/// name: Starter
/// token_amount: 5
/// price_in_cents: 5000
/// display_order: 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPackageSpec {
    pub name: String,
    pub token_amount: i64,
    pub price_in_cents: i64,
    /// Derived from price and token amount when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_token: Option<i64>,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TokenPackageSpec {
    pub fn resolved_price_per_token(&self) -> i64 {
        self.price_per_token.unwrap_or_else(|| {
            if self.token_amount > 0 {
                self.price_in_cents / self.token_amount
            } else {
                0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_spec_with_defaults() {
        let yaml = r#"
name: Pacote Básico
token_amount: 10
price_in_cents: 9000
display_order: 2
"#;
        let spec: TokenPackageSpec = serde_yml::from_str(yaml).unwrap();
        assert!(spec.active);
        assert_eq!(spec.resolved_price_per_token(), 900);
    }

    #[test]
    fn test_explicit_price_per_token_wins() {
        let spec = TokenPackageSpec {
            name: "odd".to_string(),
            token_amount: 3,
            price_in_cents: 1000,
            price_per_token: Some(350),
            display_order: 0,
            active: true,
        };
        assert_eq!(spec.resolved_price_per_token(), 350);
    }
}
