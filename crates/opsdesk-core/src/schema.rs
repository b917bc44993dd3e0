//! The static description of the admin API that grounds generated code.

use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::api::{Verb, NAMESPACES};
use crate::config::Config;
use crate::error::ConfigError;

/// Navigation targets a component may link to.
pub const PAGES: &[(&str, &str)] = &[
    ("/", "Dashboard overview"),
    ("/operations", "Orders and customers"),
    ("/marketing", "Campaigns and promotions"),
    ("/inventory", "Products and stock movements"),
    ("/logistics", "Shipments and warehouses"),
    ("/users", "Admin users"),
    ("/generated", "Generated components"),
];

/// Query parameters each list endpoint understands.
const FILTERS: &[(&str, &[&str])] = &[
    ("operationsAPI.getOrders", &["status", "limit", "offset"]),
    ("operationsAPI.getCustomers", &["status", "limit", "offset"]),
    ("marketingAPI.getCampaigns", &["status"]),
    ("marketingAPI.getPromotions", &["status"]),
    ("inventoryAPI.getProducts", &["category", "status", "low_stock ('true')"]),
    ("inventoryAPI.getStockMovements", &["product_id", "limit"]),
    ("logisticsAPI.getShipments", &["status", "order_id"]),
    ("analyticsAPI.getRevenueTrends", &["days"]),
    ("analyticsAPI.getTopProducts", &["limit"]),
    ("usersAPI.getUsers", &["status", "role", "limit", "offset"]),
];

fn entities() -> Value {
    json!({
        "orders": {
            "module": "operations",
            "fields": {
                "id": "integer", "order_number": "string (unique)", "customer_name": "string",
                "customer_email": "string", "total_amount": "number",
                "status": "pending | processing | shipped | completed | cancelled",
                "payment_status": "unpaid | paid | refunded",
                "created_at": "datetime", "updated_at": "datetime"
            }
        },
        "customers": {
            "module": "operations",
            "fields": {
                "id": "integer", "name": "string", "email": "string (unique)", "phone": "string",
                "total_orders": "integer", "total_spent": "number", "status": "active | inactive",
                "created_at": "datetime"
            }
        },
        "campaigns": {
            "module": "marketing",
            "fields": {
                "id": "integer", "name": "string", "type": "email | social | search | display",
                "status": "draft | active | paused | completed", "budget": "number", "spent": "number",
                "impressions": "integer", "clicks": "integer", "conversions": "integer",
                "start_date": "date", "end_date": "date", "created_at": "datetime"
            }
        },
        "promotions": {
            "module": "marketing",
            "fields": {
                "id": "integer", "name": "string", "code": "string (unique)",
                "discount_type": "percentage | fixed", "discount_value": "number",
                "min_purchase": "number", "max_discount": "number", "usage_limit": "integer",
                "used_count": "integer", "status": "active | inactive | expired",
                "start_date": "date", "end_date": "date", "created_at": "datetime"
            }
        },
        "products": {
            "module": "inventory",
            "fields": {
                "id": "integer", "sku": "string (unique)", "name": "string", "description": "string",
                "category": "string", "price": "number", "cost": "number",
                "stock_quantity": "integer", "low_stock_threshold": "integer",
                "status": "active | inactive | discontinued",
                "created_at": "datetime", "updated_at": "datetime"
            }
        },
        "stock_movements": {
            "module": "inventory",
            "fields": {
                "id": "integer", "product_id": "integer (products.id)", "type": "in | out | adjustment",
                "quantity": "integer", "reason": "string", "reference": "string",
                "created_at": "datetime"
            }
        },
        "shipments": {
            "module": "logistics",
            "fields": {
                "id": "integer", "order_id": "integer (orders.id)", "tracking_number": "string (unique)",
                "carrier": "string", "status": "pending | in_transit | delivered | returned",
                "origin_address": "string", "destination_address": "string",
                "estimated_delivery": "date", "actual_delivery": "date", "shipping_cost": "number",
                "created_at": "datetime", "updated_at": "datetime"
            }
        },
        "warehouses": {
            "module": "logistics",
            "fields": {
                "id": "integer", "name": "string", "location": "string", "capacity": "integer",
                "current_stock": "integer", "status": "active | inactive", "created_at": "datetime"
            }
        },
        "users": {
            "module": "users",
            "fields": {
                "id": "integer", "username": "string (unique)", "email": "string (unique)",
                "full_name": "string", "role": "admin | manager | staff", "status": "active | inactive",
                "last_login": "datetime", "created_at": "datetime", "updated_at": "datetime"
            }
        }
    })
}

/// `namespace -> { function -> "METHOD path signature" }`, straight from the endpoint table.
fn apis() -> Value {
    let mut namespaces = Map::new();
    for ns in NAMESPACES {
        let mut functions = Map::new();
        for endpoint in ns.endpoints {
            let method = match endpoint.verb {
                Verb::Create => "POST",
                Verb::Update => "PUT",
                Verb::Delete => "DELETE",
                _ => "GET",
            };
            let path = match endpoint.verb {
                Verb::Get | Verb::Update | Verb::Delete => {
                    format!("{}/{{id}}", endpoint.path)
                }
                _ => endpoint.path.to_string(),
            };
            functions.insert(
                endpoint.name.to_string(),
                Value::String(format!("{} {} {}", method, path, endpoint.verb.signature())),
            );
        }
        namespaces.insert(ns.name.to_string(), Value::Object(functions));
    }
    Value::Object(namespaces)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContext {
    document: Value,
}

impl SchemaContext {
    pub fn builtin() -> Self {
        let filters: Map<String, Value> = FILTERS
            .iter()
            .map(|(name, params)| (name.to_string(), json!(params)))
            .collect();
        let pages: Map<String, Value> = PAGES
            .iter()
            .map(|(href, label)| (href.to_string(), json!(label)))
            .collect();

        Self {
            document: json!({
                "name": "Operations Admin Dashboard",
                "modules": ["operations", "marketing", "inventory", "logistics", "analytics", "users"],
                "entities": entities(),
                "apis": apis(),
                "filters": filters,
                "pages": pages,
                "responses": "Every API function returns a map #{ data: ... }; list functions put an array in data"
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded schema document");
        Ok(Self { document })
    }

    /// The configured schema file, or the built-in document when there is
    /// none or it cannot be read.
    pub fn from_config(config: &Config) -> Self {
        match &config.schema_path {
            Some(path) => Self::load(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Falling back to built-in schema");
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn to_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.document).unwrap_or_else(|_| self.document.to_string())
    }
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lists_every_endpoint() {
        let schema = SchemaContext::builtin();
        let apis = &schema.document()["apis"];
        for ns in NAMESPACES {
            for endpoint in ns.endpoints {
                assert!(apis[ns.name][endpoint.name].is_string(), "{}", endpoint.name);
            }
        }
        assert_eq!(
            apis["usersAPI"]["deleteUser"],
            "DELETE /users/{id} (id)"
        );
        assert_eq!(
            apis["inventoryAPI"]["getProducts"],
            "GET /inventory/products (params?)"
        );
    }

    #[test]
    fn test_pretty_text_includes_entities() {
        let text = SchemaContext::builtin().to_pretty();
        assert!(text.contains("low_stock_threshold"));
        assert!(text.contains("\"warehouses\""));
    }

    #[test]
    fn test_load_override_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, r#"{"name": "Custom"}"#).unwrap();

        let mut config = Config::new();
        config.schema_path = Some(path);
        assert_eq!(SchemaContext::from_config(&config).document()["name"], "Custom");

        config.schema_path = Some(dir.path().join("missing.json"));
        assert_eq!(SchemaContext::from_config(&config), SchemaContext::builtin());
    }
}
