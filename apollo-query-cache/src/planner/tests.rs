use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json_bytes::json;

use super::*;
use crate::extension::Visit;
use crate::merge::merge;
use crate::read::read;
use crate::test_utils::assert_plan;
use crate::test_utils::object;
use crate::test_utils::parse;

fn plan_query(cache: Value, query: &str, variables: Value) -> Option<ast::Document> {
    plan(&cache, &parse(query), &object(variables), &[]).unwrap()
}

#[test_log::test]
fn requests_only_missing_leaves() {
    let reduced = plan_query(
        json!({ "user": { "name": "John Smith" } }),
        "query { user { id name dateOfBirth } }",
        json!({}),
    );

    assert_plan(reduced, "query { user { id dateOfBirth } }");
}

#[test_log::test]
fn nothing_to_fetch_when_everything_is_cached() {
    let reduced = plan_query(
        json!({ "user": { "id": "1", "name": "John Smith", "dateOfBirth": "1990-01-01" } }),
        "query { user { id name dateOfBirth } }",
        json!({}),
    );

    assert!(reduced.is_none());
}

#[test_log::test]
fn aliases_do_not_matter() {
    let reduced = plan_query(
        json!({ "user": { "id": "1" } }),
        "{ me: user { identifier: id } }",
        json!({}),
    );

    assert!(reduced.is_none());
}

#[test_log::test]
fn null_and_empty_lists_short_circuit() {
    let reduced = plan_query(
        json!({ "user": { "id": "1", "address": null, "friends": [] } }),
        "{ user { id address { city street } friends { id name } } }",
        json!({}),
    );

    assert!(reduced.is_none());
}

#[test_log::test]
fn never_fetched_subtrees_are_requested_as_written() {
    let reduced = plan_query(
        json!({ "user": { "id": "1" } }),
        "{ user { id address { city street } } }",
        json!({}),
    );

    assert_plan(reduced, "{ user { address { city street } } }");
}

#[test_log::test]
fn heterogeneous_lists_are_requested_whole() {
    let reduced = plan_query(
        json!({
            "user": {
                "friends": [
                    { "id": "1", "name": "Ada" },
                    { "id": "2" }
                ]
            }
        }),
        "{ user { friends { id name } } }",
        json!({}),
    );

    assert_plan(reduced, "{ user { friends { id name } } }");
}

#[test_log::test]
fn lists_missing_nested_data_are_requested_whole() {
    let reduced = plan_query(
        json!({
            "user": {
                "friends": [
                    { "id": "1", "name": "Ada", "address": { "city": "London" } },
                    { "id": "2", "name": "Grace", "address": { "city": "New York" } }
                ]
            }
        }),
        "{ user { friends { id name address { city zip } } } }",
        json!({}),
    );

    assert_plan(
        reduced,
        "{ user { friends { id name address { city zip } } } }",
    );
}

#[test_log::test]
fn lists_are_dropped_when_their_elements_are_complete() {
    let reduced = plan_query(
        json!({
            "user": {
                "name": "Ada",
                "friends": [
                    { "id": "1", "address": { "city": "London" } },
                    { "id": "2", "address": { "city": "New York" } }
                ]
            }
        }),
        "{ user { name email friends { id address { city } } } }",
        json!({}),
    );

    assert_plan(reduced, "{ user { email } }");
}

#[test_log::test]
fn nested_lists_are_visited_element_by_element() {
    let reduced = plan_query(
        json!({ "grid": [[{ "x": 1 }, null], [{ "x": 2 }]] }),
        "{ grid { x } }",
        json!({}),
    );

    assert!(reduced.is_none());
}

#[test_log::test]
fn fragments_are_reduced_in_place() {
    let query = r#"
        query {
          user {
            ...UserFields
          }
        }

        fragment UserFields on User {
          id
          name
          address {
            city
          }
        }
    "#;
    let expected = r#"
        query {
          user {
            ...UserFields
          }
        }

        fragment UserFields on User {
          address {
            city
          }
        }
    "#;

    let reduced = plan_query(
        json!({ "user": { "id": "1", "name": "Ada" } }),
        query,
        json!({}),
    );

    assert_plan(reduced, expected);
}

#[test_log::test]
fn satisfied_fragments_disappear_with_their_spreads() {
    let query = r#"
        query {
          user {
            email
            ...UserFields
          }
        }

        fragment UserFields on User {
          id
          name
        }
    "#;

    let reduced = plan_query(
        json!({ "user": { "id": "1", "name": "Ada" } }),
        query,
        json!({}),
    );

    assert_plan(reduced, "query { user { email } }");
}

#[test_log::test]
fn unused_variables_are_removed() {
    let query = r#"
        query User($id: ID, $limit: Int) {
          user(id: $id) {
            name
            friends(limit: $limit) {
              id
            }
          }
        }
    "#;
    let cache = json!({
        "user|{\"id\":\"1\"}": {
            "friends|{\"limit\":\"2\"}": [{ "id": "2" }]
        }
    });

    let reduced = plan_query(cache, query, json!({ "id": "1", "limit": 2 }));

    assert_plan(reduced, "query User($id: ID) { user(id: $id) { name } }");
}

#[test_log::test]
fn variables_used_by_surviving_fragments_are_kept() {
    let query = r#"
        query User($id: ID, $size: Int) {
          user(id: $id) {
            ...Avatar
          }
        }

        fragment Avatar on User {
          avatar(size: $size)
        }
    "#;

    let reduced = plan_query(json!({}), query, json!({ "id": "1", "size": 64 }));

    assert_plan(reduced, query);
}

#[test_log::test]
fn fragments_for_other_types_are_left_alone() {
    let query = r#"
        {
          feed {
            ... on Car { speed }
            ... on Plant { height }
          }
        }
    "#;

    let cached = json!({
        "feed": [
            { "__typename": "Car", "speed": 100 },
            { "__typename": "Plant", "height": 3 }
        ]
    });
    assert!(plan_query(cached, query, json!({})).is_none());

    let missing_height = json!({
        "feed": [
            { "__typename": "Car", "speed": 100 },
            { "__typename": "Plant" }
        ]
    });
    assert_plan(plan_query(missing_height, query, json!({})), query);
}

#[test_log::test]
fn other_operations_pass_through() {
    let query = r#"
        mutation Like {
          like(id: 1) {
            ...Likes
          }
        }

        fragment Likes on Post {
          likes
        }
    "#;

    let reduced = plan_query(json!({ "like|{\"id\":\"1\"}": { "likes": 3 } }), query, json!({}));

    assert_plan(reduced, query);
}

#[test_log::test]
fn unresolved_variables_are_errors() {
    let error = plan(
        &json!({}),
        &parse("query($limit: Int) { friends(limit: $limit) { id } }"),
        &Object::new(),
        &[],
    )
    .unwrap_err();

    assert_eq!(
        error,
        CacheError::UnresolvedVariable {
            name: "limit".to_string()
        }
    );
}

#[test_log::test]
fn the_document_is_not_modified() {
    let document = parse("query($id: ID) { user(id: $id) { id ...F } } fragment F on User { name }");
    let before = document.to_string();

    plan(
        &json!({ "user|{\"id\":\"1\"}": { "id": "1", "name": "Ada" } }),
        &document,
        &object(json!({ "id": "1" })),
        &[],
    )
    .unwrap();

    assert_eq!(document.to_string(), before);
}

struct KeepNames;

impl Extension for KeepNames {
    fn name(&self) -> &'static str {
        "keep_names"
    }

    fn plan_enter_field(
        &self,
        field: &Node<ast::Field>,
        _context: &mut PlanContext<'_>,
        _cache_key: &str,
    ) -> Visit {
        if field.name.as_str() == "name" {
            Visit::Keep
        } else {
            Visit::Continue
        }
    }
}

#[test_log::test]
fn extensions_can_keep_cached_fields() {
    let extensions: Vec<Arc<dyn Extension>> = vec![Arc::new(KeepNames)];
    let reduced = plan(
        &json!({ "user": { "id": "1", "name": "Ada" } }),
        &parse("{ user { id name } }"),
        &Object::new(),
        &extensions,
    )
    .unwrap();

    assert_plan(reduced, "{ user { name } }");
}

struct RequireTypename;

impl Extension for RequireTypename {
    fn name(&self) -> &'static str {
        "require_typename"
    }

    fn plan_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut PlanContext<'_>,
    ) -> Visit {
        if context.needs_fetch() {
            context.require_field("__typename");
        }
        Visit::Continue
    }
}

#[test_log::test]
fn extensions_can_require_fields() {
    let extensions: Vec<Arc<dyn Extension>> = vec![Arc::new(RequireTypename)];
    let reduced = plan(
        &json!({ "user": { "id": "1" }, "viewer": { "id": "2" } }),
        &parse("{ user { id name } viewer { id } }"),
        &Object::new(),
        &extensions,
    )
    .unwrap();

    assert_plan(reduced, "{ user { name __typename } }");
}

/// Fetches the plan from a server knowing `data`, merges the answer, and checks that the
/// cache then answers `query` completely.
#[rstest]
#[case::missing_leaves(
    json!({ "user": { "name": "Ada" } }),
    "{ user { id name dateOfBirth } }",
    json!({ "user": { "id": "1", "name": "Ada", "dateOfBirth": "1815-12-10" } })
)]
#[case::nested_list_data(
    json!({
        "user": {
            "friends": [
                { "id": "1", "name": "Ada", "address": { "city": "London" } },
                { "id": "2", "name": "Grace", "address": { "city": "New York" } }
            ]
        }
    }),
    "{ user { friends { id name address { city zip } } } }",
    json!({
        "user": {
            "friends": [
                { "id": "1", "name": "Ada", "address": { "city": "London", "zip": "N1" } },
                { "id": "2", "name": "Grace", "address": { "city": "New York", "zip": "10001" } }
            ]
        }
    })
)]
#[case::heterogeneous_list(
    json!({ "user": { "friends": [{ "id": "1", "name": "Ada" }, { "id": "2" }] } }),
    "{ user { friends { id name } } }",
    json!({ "user": { "friends": [{ "id": "1", "name": "Ada" }, { "id": "2", "name": "Grace" }] } })
)]
#[case::nested_lists(
    json!({ "grid": [[{ "x": 1 }], [{ "x": 2 }]] }),
    "{ grid { x y } }",
    json!({ "grid": [[{ "x": 1, "y": 3 }], [{ "x": 2, "y": 4 }]] })
)]
#[case::fragments(
    json!({ "user": { "id": "1", "name": "Ada" } }),
    "{ user { ...UserFields } } fragment UserFields on User { id name address { city } }",
    json!({ "user": { "id": "1", "name": "Ada", "address": { "city": "London" } } })
)]
fn fetching_the_plan_completes_the_cache(
    #[case] cache: Value,
    #[case] query: &str,
    #[case] data: Value,
) {
    let query = parse(query);
    let variables = Object::new();
    let server = merge(&json!({}), &query, &data, &variables, &[]).unwrap();

    let reduced = plan(&cache, &query, &variables, &[])
        .unwrap()
        .expect("something left to fetch");
    let answer = read(&server, &reduced, &variables, &[]).unwrap();
    let cache = merge(&cache, &reduced, &answer, &variables, &[]).unwrap();

    assert!(plan(&cache, &query, &variables, &[]).unwrap().is_none());
    assert_eq!(read(&cache, &query, &variables, &[]).unwrap(), data);
}
