//! Parameterized query templates.
//!
//! A [`QueryDefinition`] is a statement with positional placeholders and an
//! ordered list of named parameters. Callers override parameters by name;
//! [`QueryCatalog::bind`] resolves the final positional values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::QueryError;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Text,
    Integer,
    Boolean,
    TextList,
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
    TextList(Vec<String>),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Boolean(_) => ParameterKind::Boolean,
            ParameterValue::Integer(_) => ParameterKind::Integer,
            ParameterValue::Text(_) => ParameterKind::Text,
            ParameterValue::TextList(_) => ParameterKind::TextList,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

/// Named parameter overrides for one execution.
pub type ParameterOverrides = BTreeMap<String, ParameterValue>;

/// One named, positional parameter of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub default: Option<ParameterValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDefinition {
    pub id: String,
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
}

impl QueryDefinition {
    /// Whether a parameter named `name` is declared.
    pub fn declares(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }
}

/// A statement with its positional values resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    pub id: String,
    pub statement: String,
    pub values: Vec<ParameterValue>,
}

/// All known query definitions, by id.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    definitions: HashMap<String, QueryDefinition>,
}

impl QueryCatalog {
    pub fn new(definitions: impl IntoIterator<Item = QueryDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Result<&QueryDefinition, QueryError> {
        self.definitions
            .get(id)
            .ok_or_else(|| QueryError::TemplateNotFound {
                template: id.to_string(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Resolve positional values: override by name, else the default.
    ///
    /// Overrides naming an undeclared parameter, values of the wrong kind,
    /// and parameters with neither override nor default are all errors.
    pub fn bind(&self, id: &str, overrides: &ParameterOverrides) -> Result<BoundQuery, QueryError> {
        let definition = self.get(id)?;

        if let Some(unknown) = overrides
            .keys()
            .find(|name| !definition.declares(name))
        {
            return Err(QueryError::UnknownParameter {
                template: id.to_string(),
                parameter: unknown.clone(),
            });
        }

        let values = definition
            .parameters
            .iter()
            .map(|param| {
                let value = overrides
                    .get(&param.name)
                    .or(param.default.as_ref())
                    .cloned()
                    .ok_or_else(|| QueryError::MissingParameter {
                        template: id.to_string(),
                        parameter: param.name.clone(),
                    })?;
                coerce(id, param, value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BoundQuery {
            id: id.to_string(),
            statement: definition.statement.clone(),
            values,
        })
    }
}

fn coerce(id: &str, param: &ParameterDef, value: ParameterValue) -> Result<ParameterValue, QueryError> {
    match (param.kind, value) {
        (kind, value) if value.kind() == kind => Ok(value),
        // A single name is a one-element list.
        (ParameterKind::TextList, ParameterValue::Text(s)) => Ok(ParameterValue::TextList(vec![s])),
        (kind, value) => Err(QueryError::Execution {
            template: id.to_string(),
            reason: format!(
                "parameter {} expects {:?} but got {:?}",
                param.name,
                kind,
                value.kind()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> QueryCatalog {
        QueryCatalog::new(vec![QueryDefinition {
            id: "db_paths".to_string(),
            statement: "SELECT tbl_name, location FROM tbls WHERE db_name = ANY($1) AND tbl_type = $2".to_string(),
            parameters: vec![
                ParameterDef {
                    name: "dbs".to_string(),
                    kind: ParameterKind::TextList,
                    default: None,
                },
                ParameterDef {
                    name: "tbl_type".to_string(),
                    kind: ParameterKind::Text,
                    default: Some("MANAGED_TABLE".into()),
                },
            ],
        }])
    }

    #[test]
    fn test_bind_uses_defaults_and_overrides() {
        let mut overrides = ParameterOverrides::new();
        overrides.insert("dbs".to_string(), "db1".into());
        let bound = catalog().bind("db_paths", &overrides).unwrap();
        assert_eq!(
            bound.values,
            vec![
                ParameterValue::TextList(vec!["db1".to_string()]),
                ParameterValue::Text("MANAGED_TABLE".to_string()),
            ]
        );

        overrides.insert("tbl_type".to_string(), "EXTERNAL_TABLE".into());
        let bound = catalog().bind("db_paths", &overrides).unwrap();
        assert_eq!(bound.values[1], ParameterValue::Text("EXTERNAL_TABLE".to_string()));
    }

    #[test]
    fn test_bind_errors() {
        let catalog = catalog();
        assert_eq!(
            catalog.bind("nope", &ParameterOverrides::new()),
            Err(QueryError::TemplateNotFound {
                template: "nope".to_string()
            })
        );
        assert!(matches!(
            catalog.bind("db_paths", &ParameterOverrides::new()),
            Err(QueryError::MissingParameter { .. })
        ));

        let mut overrides = ParameterOverrides::new();
        overrides.insert("dbs".to_string(), "db1".into());
        overrides.insert("owner".to_string(), "hive".into());
        assert!(matches!(
            catalog.bind("db_paths", &overrides),
            Err(QueryError::UnknownParameter { .. })
        ));

        let mut overrides = ParameterOverrides::new();
        overrides.insert("dbs".to_string(), ParameterValue::Integer(3));
        assert!(matches!(
            catalog.bind("db_paths", &overrides),
            Err(QueryError::Execution { .. })
        ));
    }

    #[test]
    fn test_contains_and_declares() {
        let catalog = catalog();
        assert!(catalog.contains("db_paths"));
        assert!(!catalog.contains("db_listing"));

        let definition = catalog.get("db_paths").unwrap();
        assert!(definition.declares("dbs"));
        assert!(!definition.declares("database"));
    }

    #[test]
    fn test_parameter_values_deserialize_untagged() {
        let values: BTreeMap<String, ParameterValue> =
            serde_json::from_str(r#"{"a": "x", "b": 3, "c": true, "d": ["p", "q"]}"#).unwrap();
        assert_eq!(values["a"], ParameterValue::Text("x".to_string()));
        assert_eq!(values["b"], ParameterValue::Integer(3));
        assert_eq!(values["c"], ParameterValue::Boolean(true));
        assert_eq!(
            values["d"],
            ParameterValue::TextList(vec!["p".to_string(), "q".to_string()])
        );
    }
}
