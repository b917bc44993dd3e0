//! Bindings for the admin REST API.
//!
//! The endpoint table mirrors the collaborator routes namespace by namespace.
//! Generated components reach it through the sandbox, the prompt schema lists
//! it, and [`ApiTransport`] is the one place requests actually leave the
//! process.

pub mod http;

pub use http::HttpApiClient;

use serde_json::Value;
use std::fmt;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }
}

/// Blocking request execution, called from the render thread.
pub trait ApiTransport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<Value, ApiError>;
}

/// What an endpoint does with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `GET path` with an optional params map as the query string.
    List,
    /// `GET path/{id}`
    Get,
    /// `POST path` with a body.
    Create,
    /// `PUT path/{id}` with a body.
    Update,
    /// `DELETE path/{id}`
    Delete,
    /// `GET path`, no arguments (stats and overviews).
    Fetch,
}

impl Verb {
    pub fn signature(&self) -> &'static str {
        match self {
            Verb::List => "(params?)",
            Verb::Get | Verb::Delete => "(id)",
            Verb::Create => "(data)",
            Verb::Update => "(id, data)",
            Verb::Fetch => "()",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub name: &'static str,
    pub verb: Verb,
    pub path: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Namespace {
    pub name: &'static str,
    pub endpoints: &'static [Endpoint],
}

const fn ep(name: &'static str, verb: Verb, path: &'static str) -> Endpoint {
    Endpoint { name, verb, path }
}

pub const NAMESPACES: &[Namespace] = &[
    Namespace {
        name: "operationsAPI",
        endpoints: &[
            ep("getOrders", Verb::List, "/operations/orders"),
            ep("getOrder", Verb::Get, "/operations/orders"),
            ep("createOrder", Verb::Create, "/operations/orders"),
            ep("updateOrder", Verb::Update, "/operations/orders"),
            ep("getCustomers", Verb::List, "/operations/customers"),
            ep("getCustomer", Verb::Get, "/operations/customers"),
            ep("updateCustomer", Verb::Update, "/operations/customers"),
            ep("getOrderStats", Verb::Fetch, "/operations/orders/stats"),
        ],
    },
    Namespace {
        name: "marketingAPI",
        endpoints: &[
            ep("getCampaigns", Verb::List, "/marketing/campaigns"),
            ep("getCampaign", Verb::Get, "/marketing/campaigns"),
            ep("createCampaign", Verb::Create, "/marketing/campaigns"),
            ep("updateCampaign", Verb::Update, "/marketing/campaigns"),
            ep("getPromotions", Verb::List, "/marketing/promotions"),
            ep("getPromotion", Verb::Get, "/marketing/promotions"),
            ep("createPromotion", Verb::Create, "/marketing/promotions"),
            ep("updatePromotion", Verb::Update, "/marketing/promotions"),
        ],
    },
    Namespace {
        name: "inventoryAPI",
        endpoints: &[
            ep("getProducts", Verb::List, "/inventory/products"),
            ep("getProduct", Verb::Get, "/inventory/products"),
            ep("createProduct", Verb::Create, "/inventory/products"),
            ep("updateProduct", Verb::Update, "/inventory/products"),
            ep("getStockMovements", Verb::List, "/inventory/stock-movements"),
            ep("createStockMovement", Verb::Create, "/inventory/stock-movements"),
            ep("getProductStats", Verb::Fetch, "/inventory/products/stats"),
        ],
    },
    Namespace {
        name: "logisticsAPI",
        endpoints: &[
            ep("getShipments", Verb::List, "/logistics/shipments"),
            ep("getShipment", Verb::Get, "/logistics/shipments"),
            ep("createShipment", Verb::Create, "/logistics/shipments"),
            ep("updateShipment", Verb::Update, "/logistics/shipments"),
            ep("getWarehouses", Verb::List, "/logistics/warehouses"),
            ep("getWarehouse", Verb::Get, "/logistics/warehouses"),
            ep("createWarehouse", Verb::Create, "/logistics/warehouses"),
            ep("updateWarehouse", Verb::Update, "/logistics/warehouses"),
            ep("getShipmentStats", Verb::Fetch, "/logistics/shipments/stats"),
        ],
    },
    Namespace {
        name: "analyticsAPI",
        endpoints: &[
            ep("getOverview", Verb::Fetch, "/analytics/overview"),
            ep("getRevenueTrends", Verb::List, "/analytics/revenue-trends"),
            ep("getTopProducts", Verb::List, "/analytics/top-products"),
        ],
    },
    Namespace {
        name: "usersAPI",
        endpoints: &[
            ep("getUsers", Verb::List, "/users"),
            ep("getUser", Verb::Get, "/users"),
            ep("createUser", Verb::Create, "/users"),
            ep("updateUser", Verb::Update, "/users"),
            ep("deleteUser", Verb::Delete, "/users"),
        ],
    },
];

pub fn find_endpoint(namespace: &str, name: &str) -> Option<&'static Endpoint> {
    NAMESPACES
        .iter()
        .find(|ns| ns.name == namespace)?
        .endpoints
        .iter()
        .find(|endpoint| endpoint.name == name)
}

fn invalid(path: &str, message: impl Into<String>) -> ApiError {
    ApiError::InvalidRequest {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Ids arrive as numbers or as the string value of a dropdown option. String
/// ids become a single path segment, so only `[A-Za-z0-9_-]` is allowed.
fn id_segment(path: &str, id: &Value) -> Result<String, ApiError> {
    match id {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                Ok(s.to_string())
            } else {
                Err(invalid(path, format!("invalid id {:?}", s)))
            }
        }
        other => Err(invalid(path, format!("expected an id, got {}", other))),
    }
}

fn query_pairs(path: &str, params: Option<&Value>) -> Result<Vec<(String, String)>, ApiError> {
    match params {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()),
        Some(other) => Err(invalid(path, format!("params must be a map, got {}", other))),
    }
}

impl Endpoint {
    fn arg<'a>(&self, args: &'a [Value], index: usize) -> Result<&'a Value, ApiError> {
        args.get(index).ok_or_else(|| {
            invalid(
                self.path,
                format!("{} expects {}", self.name, self.verb.signature()),
            )
        })
    }

    /// Turn script arguments into a request, validating their shape.
    pub fn request(&self, args: &[Value]) -> Result<ApiRequest, ApiError> {
        let path = self.path;
        let arg = |i: usize| self.arg(args, i);

        let request = match self.verb {
            Verb::List => ApiRequest {
                query: query_pairs(path, args.first())?,
                ..ApiRequest::get(path)
            },
            Verb::Fetch => ApiRequest::get(path),
            Verb::Get => ApiRequest::get(format!("{}/{}", path, id_segment(path, arg(0)?)?)),
            Verb::Delete => ApiRequest {
                method: Method::Delete,
                ..ApiRequest::get(format!("{}/{}", path, id_segment(path, arg(0)?)?))
            },
            Verb::Create => ApiRequest {
                method: Method::Post,
                body: Some(arg(0)?.clone()),
                ..ApiRequest::get(path)
            },
            Verb::Update => ApiRequest {
                method: Method::Put,
                body: Some(arg(1)?.clone()),
                ..ApiRequest::get(format!("{}/{}", path, id_segment(path, arg(0)?)?))
            },
        };
        Ok(request)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and answers from a fixed table keyed by `METHOD path`.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub requests: Mutex<Vec<ApiRequest>>,
        pub responses: Vec<(String, Value)>,
    }

    impl RecordingTransport {
        pub fn with(responses: Vec<(&str, Value)>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: responses
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }
        }

        pub fn sent(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ApiTransport for RecordingTransport {
        fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            let key = format!("{} {}", request.method, request.path);
            self.responses
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .ok_or(ApiError::Status {
                    path: request.path.clone(),
                    status: 404,
                    body: "not found".to_string(),
                })
        }
    }

    #[test]
    fn test_every_namespace_is_present() {
        let names: Vec<_> = NAMESPACES.iter().map(|ns| ns.name).collect();
        assert_eq!(
            names,
            [
                "operationsAPI",
                "marketingAPI",
                "inventoryAPI",
                "logisticsAPI",
                "analyticsAPI",
                "usersAPI"
            ]
        );
        assert!(find_endpoint("usersAPI", "deleteUser").is_some());
        assert!(find_endpoint("usersAPI", "dropTable").is_none());
    }

    #[test]
    fn test_list_request_stringifies_params() {
        let endpoint = find_endpoint("inventoryAPI", "getProducts").unwrap();
        let request = endpoint
            .request(&[json!({ "low_stock": "true", "limit": 100, "category": null })])
            .unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/inventory/products");
        assert!(request.query.contains(&("low_stock".to_string(), "true".to_string())));
        assert!(request.query.contains(&("limit".to_string(), "100".to_string())));
        assert_eq!(request.query.len(), 2);
    }

    #[test]
    fn test_update_request_accepts_string_ids() {
        let endpoint = find_endpoint("operationsAPI", "updateOrder").unwrap();
        let request = endpoint
            .request(&[json!("42"), json!({ "status": "shipped" })])
            .unwrap();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, "/operations/orders/42");
        assert_eq!(request.body, Some(json!({ "status": "shipped" })));
    }

    #[test]
    fn test_string_ids_cannot_leave_their_segment() {
        let endpoint = find_endpoint("usersAPI", "getUser").unwrap();
        for id in ["1/../../users", "7?admin=true", "a b", "..", ""] {
            assert!(
                matches!(
                    endpoint.request(&[json!(id)]),
                    Err(ApiError::InvalidRequest { .. })
                ),
                "{:?} was accepted",
                id
            );
        }
        let request = endpoint.request(&[json!(" usr_7-b ")]).unwrap();
        assert_eq!(request.path, "/users/usr_7-b");
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        let endpoint = find_endpoint("usersAPI", "updateUser").unwrap();
        assert!(matches!(
            endpoint.request(&[json!(1)]),
            Err(ApiError::InvalidRequest { .. })
        ));
        let delete = find_endpoint("usersAPI", "deleteUser").unwrap();
        assert!(delete.request(&[json!({})]).is_err());
    }
}
