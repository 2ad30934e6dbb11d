// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use serde::Serialize;

/// A parameterized query.
///
/// The `query` parameter of most query APIs accepts anything that can be
/// transformed [`Into`] a [`Query`], so simple unparameterized queries can be
/// expressed as plain strings:
///
/// ```rust
/// use strato_docdb::Query;
///
/// let query = Query::from("SELECT * FROM c WHERE c.state = @state")
///     .with_parameter("@state", "open")
///     .unwrap();
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct Query {
    #[serde(rename = "query")]
    text: String,

    parameters: Vec<QueryParameter>,
}

#[derive(Clone, Debug, Serialize)]
struct QueryParameter {
    name: String,
    value: serde_json::Value,
}

impl Query {
    /// The query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Adds a parameter, serializing the value to JSON.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> crate::Result<Self> {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: serde_json::to_value(value)?,
        });
        Ok(self)
    }

    /// Number of parameters bound to this query.
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self {
            text,
            parameters: Vec::new(),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        text.to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_text_and_parameters() {
        let query = Query::from("SELECT * FROM c WHERE c.id = @id")
            .with_parameter("@id", "item1")
            .unwrap();

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["query"], "SELECT * FROM c WHERE c.id = @id");
        assert_eq!(json["parameters"][0]["name"], "@id");
        assert_eq!(json["parameters"][0]["value"], "item1");
    }

    #[test]
    fn unparameterized_query_serializes_empty_list() {
        let query: Query = "SELECT * FROM c".into();
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["parameters"].as_array().unwrap().len(), 0);
    }
}
