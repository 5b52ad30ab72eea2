use std::collections::HashMap;

use async_trait::async_trait;
use graphql_parser::query::{
    Definition, Field, FragmentDefinition, OperationDefinition, Selection, SelectionSet,
    TypeCondition, parse_query,
};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    ExecutionRequest, JsonObject,
    query_executor::{ExecutorError, QueryExecutor},
};

const TEST_FIELD_VALUE: &str = "Hello World!";

/// In-process executor for the built-in schema:
///
/// ```graphql
/// type Query { testField: String! }
/// type Mutation { testField: String! }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSchemaExecutor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RootType {
    Query,
    Mutation,
}

impl RootType {
    fn name(self) -> &'static str {
        match self {
            RootType::Query => "Query",
            RootType::Mutation => "Mutation",
        }
    }
}

impl LocalSchemaExecutor {
    pub fn new() -> Self {
        LocalSchemaExecutor
    }

    /// Executes `query` and returns the GraphQL response envelope.
    pub fn run(&self, query: Option<&str>, operation_name: Option<&str>) -> Value {
        match resolve_document(query, operation_name) {
            Ok(data) => json!({ "data": data }),
            Err(message) => json!({ "errors": [{ "message": message }] }),
        }
    }
}

#[async_trait]
impl QueryExecutor for LocalSchemaExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutorError> {
        debug!(operation_name = ?request.operation_name, "executing against local schema");
        Ok(self.run(
            request.query.as_deref(),
            request.operation_name.as_deref(),
        ))
    }
}

fn resolve_document(query: Option<&str>, operation_name: Option<&str>) -> Result<Value, String> {
    let query = query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| "No query string was present".to_string())?;

    let document = parse_query::<String>(query).map_err(|e| e.to_string())?;

    let mut operations = Vec::new();
    let mut fragments = HashMap::new();
    for definition in &document.definitions {
        match definition {
            Definition::Operation(operation) => operations.push(operation),
            Definition::Fragment(fragment) => {
                fragments.insert(fragment.name.as_str(), fragment);
            }
        }
    }

    let operation = select_operation(&operations, operation_name)?;
    let (root, selection_set) = match operation {
        OperationDefinition::SelectionSet(selection_set) => (RootType::Query, selection_set),
        OperationDefinition::Query(query) => (RootType::Query, &query.selection_set),
        OperationDefinition::Mutation(mutation) => (RootType::Mutation, &mutation.selection_set),
        OperationDefinition::Subscription(_) => {
            return Err("Subscriptions are not supported".to_string());
        }
    };

    let resolver = Resolver { root, fragments };
    let mut data = Map::new();
    resolver.collect(selection_set, &mut data, &mut Vec::new())?;

    Ok(Value::Object(data))
}

fn operation_name<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

fn select_operation<'d, 'a>(
    operations: &[&'d OperationDefinition<'a, String>],
    requested: Option<&str>,
) -> Result<&'d OperationDefinition<'a, String>, String> {
    match requested {
        Some(name) => operations
            .iter()
            .copied()
            .find(|operation| operation_name(operation) == Some(name))
            .ok_or_else(|| format!("Unknown operation named \"{name}\"")),
        None => match operations {
            [single] => Ok(*single),
            [] => Err("No operations in query document".to_string()),
            _ => Err("An operation name is required".to_string()),
        },
    }
}

struct Resolver<'d, 'a> {
    root: RootType,
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
}

impl<'d, 'a> Resolver<'d, 'a> {
    fn collect(
        &self,
        selection_set: &'d SelectionSet<'a, String>,
        data: &mut JsonObject,
        visited: &mut Vec<&'d str>,
    ) -> Result<(), String> {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let key = field.alias.as_deref().unwrap_or(field.name.as_str());
                    data.insert(key.to_string(), self.resolve_field(field)?);
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if visited.contains(&name) {
                        return Err(format!("Fragment {name} contains an infinite loop"));
                    }
                    let fragment = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| format!("Fragment {name} was used, but not defined"))?;
                    if self.applies(&fragment.type_condition) {
                        visited.push(name);
                        self.collect(&fragment.selection_set, data, visited)?;
                        visited.pop();
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline
                        .type_condition
                        .as_ref()
                        .is_none_or(|condition| self.applies(condition));
                    if applies {
                        self.collect(&inline.selection_set, data, visited)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn applies(&self, condition: &TypeCondition<'a, String>) -> bool {
        let TypeCondition::On(type_name) = condition;
        type_name == self.root.name()
    }

    fn resolve_field(&self, field: &Field<'a, String>) -> Result<Value, String> {
        match field.name.as_str() {
            "__typename" => Ok(json!(self.root.name())),
            "testField" if !field.selection_set.items.is_empty() => Err(
                "Selections can't be made on scalars (field 'testField' returns String)"
                    .to_string(),
            ),
            "testField" => Ok(json!(TEST_FIELD_VALUE)),
            other => Err(format!(
                "Field '{other}' doesn't exist on type '{}'",
                self.root.name()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(query: &str, operation_name: Option<&str>) -> Value {
        LocalSchemaExecutor::new().run(Some(query), operation_name)
    }

    #[test]
    fn resolves_hello_query() {
        assert_eq!(
            run("query HelloQuery { testField }", None),
            json!({ "data": { "testField": "Hello World!" } })
        );
    }

    #[test]
    fn resolves_typename_on_both_roots() {
        assert_eq!(
            run("query Query1 { __typename }", None),
            json!({ "data": { "__typename": "Query" } })
        );
        assert_eq!(
            run("mutation TestMutation { testField __typename }", None),
            json!({ "data": { "testField": "Hello World!", "__typename": "Mutation" } })
        );
    }

    #[test]
    fn honours_aliases_and_fragments() {
        let query = r#"
            query Aliased {
              greeting: testField
              ...Extra
              ... on Query { kind: __typename }
              ... on Mutation { ignored: testField }
            }
            fragment Extra on Query { again: testField }
        "#;

        assert_eq!(
            run(query, None),
            json!({
                "data": {
                    "greeting": "Hello World!",
                    "again": "Hello World!",
                    "kind": "Query",
                }
            })
        );
    }

    #[test]
    fn selects_operation_by_name() {
        let query = "query A { __typename } mutation B { testField }";

        assert_eq!(
            run(query, Some("B")),
            json!({ "data": { "testField": "Hello World!" } })
        );
        assert_eq!(
            run(query, None),
            json!({ "errors": [{ "message": "An operation name is required" }] })
        );
        assert_eq!(
            run(query, Some("C")),
            json!({ "errors": [{ "message": "Unknown operation named \"C\"" }] })
        );
    }

    #[test]
    fn reports_graphql_level_errors() {
        let executor = LocalSchemaExecutor::new();

        assert_eq!(
            executor.run(None, None),
            json!({ "errors": [{ "message": "No query string was present" }] })
        );
        assert_eq!(
            run("{ missingField }", None),
            json!({ "errors": [{ "message": "Field 'missingField' doesn't exist on type 'Query'" }] })
        );
        assert!(run("query {", None)["errors"][0]["message"].is_string());
        assert!(run("subscription S { testField }", None)["errors"].is_array());
        assert!(run("{ testField { nested } }", None)["errors"].is_array());
    }

    #[test]
    fn rejects_cyclic_fragments() {
        let query = "{ ...A } fragment A on Query { ...B } fragment B on Query { ...A }";
        assert_eq!(
            run(query, None),
            json!({ "errors": [{ "message": "Fragment A contains an infinite loop" }] })
        );
    }

    #[tokio::test]
    async fn executes_through_the_executor_trait() {
        let request = ExecutionRequest {
            query: Some("query HelloQuery { testField }".to_string()),
            variables: Map::new(),
            context: Default::default(),
            operation_name: Some("HelloQuery".to_string()),
        };

        let result = LocalSchemaExecutor::new().execute(request).await.unwrap();

        assert_eq!(result, json!({ "data": { "testField": "Hello World!" } }));
    }
}
