use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body posted to the GraphQL endpoint.
#[derive(Serialize, Debug)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub variables: &'a Value,
}

#[derive(Deserialize, Debug)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlErrorItem>>,
}

#[derive(Deserialize, Debug)]
pub struct GraphQlErrorItem {
    pub message: String,
}
